use nd_image_io::prelude::*;
use nd_image_io::{
    get_parallel_info, infer_axes_for_shape, merge_spacing, natural_cmp, output_axes, reorder_view,
    resolve, AxisKind, CoordsRecord, RawDiscovery, ShapeInput,
};
use ndarray::{ArrayD, IxDyn};
use std::cmp::Ordering;
use std::collections::BTreeMap;

fn axes(s: &str) -> Axes {
    s.parse().expect("Failed to parse axes")
}

fn ramp(shape: &[usize]) -> ArrayD<u32> {
    let n: usize = shape.iter().product();
    ArrayD::from_shape_vec(IxDyn(shape), (0..n as u32).collect()).expect("Failed to build ramp")
}

#[test]
fn test_error_types() {
    let err = validate_axes("zyq").unwrap_err();
    assert!(format!("{}", err).contains("Invalid axes 'zyq'"));

    let generic_err = NdImageError::Generic("Test error".to_string());
    assert_eq!(format!("{}", generic_err), "Test error");

    let range_err = NdImageError::PartitionOutOfRange {
        index: 4,
        npartitions: 2,
    };
    assert!(format!("{}", range_err).contains("Partition 4 is out of range"));

    let io_err: NdImageError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(std::error::Error::source(&io_err).is_some());
}

#[test]
fn test_parallel_config() {
    let default_config = ParallelConfig::default();
    assert!(default_config.num_threads.is_none());
    assert!(default_config.effective_threads() > 0);

    let config_4 = ParallelConfig::with_threads(4);
    assert_eq!(config_4.num_threads, Some(4));
    assert_eq!(config_4.effective_threads(), 4);

    let pool = config_4.build_pool().expect("Failed to build pool");
    assert_eq!(pool.current_num_threads(), 4);

    let all_cores_config = ParallelConfig::all_cores();
    assert!(all_cores_config.num_threads.unwrap_or(0) > 0);
}

#[test]
fn test_parallel_info() {
    let info = get_parallel_info();
    assert!(info.current_threads > 0);
    assert!(info.available_cores > 0);
    assert!(info.available_parallelism > 0);
}

#[test]
fn test_validate_axes() {
    assert_eq!(validate_axes("zyx").expect("zyx is valid").to_string(), "zyx");
    assert_eq!(validate_axes("itczyx").expect("itczyx is valid").len(), 6);
    assert!(matches!(
        validate_axes("zyz"),
        Err(NdImageError::AxisVocabulary { .. })
    ));
    assert!(matches!(
        validate_axes("zyq"),
        Err(NdImageError::AxisVocabulary { .. })
    ));
    assert!(validate_axes("ZYX").is_err());
}

#[test]
fn test_infer_axes() {
    assert!(infer_axes(0).is_err());
    assert_eq!(infer_axes(1).expect("1 dim").to_string(), "x");
    assert_eq!(infer_axes(2).expect("2 dims").to_string(), "yx");
    assert_eq!(infer_axes(3).expect("3 dims").to_string(), "zyx");
    assert_eq!(infer_axes(4).expect("4 dims").to_string(), "czyx");
    assert_eq!(infer_axes(5).expect("5 dims").to_string(), "tczyx");
    assert_eq!(infer_axes(6).expect("6 dims").to_string(), "itczyx");
    assert!(matches!(
        infer_axes(7),
        Err(NdImageError::AxisVocabulary { .. })
    ));
}

#[test]
fn test_infer_axes_rgb_heuristic() {
    let u8 = Some(DType::Uint8);
    assert_eq!(infer_axes_for_shape(&[3, 1, 2], u8).expect("cyx").to_string(), "cyx");
    assert_eq!(infer_axes_for_shape(&[1, 2, 3], u8).expect("yxc").to_string(), "yxc");
    assert_eq!(infer_axes_for_shape(&[1, 2, 9], u8).expect("zyx").to_string(), "zyx");
    assert_eq!(
        infer_axes_for_shape(&[1, 2, 3], Some(DType::Float32)).expect("yxc").to_string(),
        "yxc"
    );
    assert_eq!(infer_axes_for_shape(&[1, 2, 3], None).expect("yxc").to_string(), "yxc");
    assert_eq!(
        infer_axes_for_shape(&[1, 2, 3], Some(DType::Uint16)).expect("zyx").to_string(),
        "zyx"
    );
    assert_eq!(
        infer_axes_for_shape(&[3, 1, 2, 3], u8).expect("czyx").to_string(),
        "czyx"
    );
}

#[test]
fn test_reorder_round_trip_all_permutations() {
    let original = ramp(&[2, 3, 4]);
    let zyx = axes("zyx");
    for perm in ["zyx", "zxy", "yzx", "yxz", "xzy", "xyz"] {
        let target = axes(perm);
        let moved = reorder(original.clone(), &zyx, &target).expect("Failed to reorder");
        let expected_shape: Vec<usize> = target
            .iter()
            .map(|k| original.shape()[zyx.position(k).unwrap_or(0)])
            .collect();
        assert_eq!(moved.shape(), expected_shape.as_slice());
        assert!(moved.is_standard_layout());
        let back = reorder(moved, &target, &zyx).expect("Failed to reorder back");
        assert_eq!(back, original, "round trip through '{}'", perm);
    }
}

#[test]
fn test_reorder_noop_returns_same_buffer() {
    let original = ramp(&[2, 3, 4]);
    let ptr = original.as_ptr();
    let same = reorder(original, &axes("zyx"), &axes("zyx")).expect("Failed to reorder");
    assert_eq!(same.as_ptr(), ptr);

    let view_source = ramp(&[2, 3, 4]);
    let borrowed = reorder_view(view_source.view(), &axes("zyx"), &axes("zyx"))
        .expect("Failed to reorder view");
    assert!(borrowed.is_view());
}

#[test]
fn test_reorder_with_longer_target_and_failures() {
    let original = ramp(&[2, 3, 4]);
    let moved = reorder(original.clone(), &axes("zyx"), &axes("itczyx")).expect("Failed to reorder");
    assert_eq!(moved, original);

    let moved = reorder(original.clone(), &axes("czx"), &axes("itczyx")).expect("Failed to reorder");
    assert_eq!(moved.shape(), &[2, 3, 4]);

    let moved = reorder(original.clone(), &axes("zcx"), &axes("itczyx")).expect("Failed to reorder");
    assert_eq!(moved.shape(), &[3, 2, 4]);
    assert_eq!(moved[[1, 0, 2]], original[[0, 1, 2]]);

    assert!(matches!(
        reorder(original.clone(), &axes("zyx"), &axes("cyx")),
        Err(NdImageError::AxisReorder { .. })
    ));
    assert!(matches!(
        reorder(original.clone(), &axes("zyx"), &axes("yx")),
        Err(NdImageError::AxisReorder { .. })
    ));
    assert!(matches!(
        reorder(original, &axes("yx"), &axes("xy")),
        Err(NdImageError::AxisVocabulary { .. })
    ));
}

#[test]
fn test_output_axes() {
    assert_eq!(
        output_axes(Some(&Axes::canonical()), &axes("xzc")).to_string(),
        "czx"
    );
    assert_eq!(output_axes(None, &axes("xzc")).to_string(), "xzc");
}

#[test]
fn test_merge_spacing_drop_rule() {
    let zyx = axes("zyx");
    let (spacing, units) = merge_spacing(
        &zyx,
        Some(&SpacingInput::Keyed(BTreeMap::from([(AxisKind::X, Some(1.0))]))),
        Some(&UnitsInput::Keyed(BTreeMap::from([(
            AxisKind::X,
            Some("pixel".to_string()),
        )]))),
    );
    assert!(spacing.is_empty());
    assert!(units.is_empty());

    let (spacing, units) = merge_spacing(
        &zyx,
        Some(&SpacingInput::Keyed(BTreeMap::from([(AxisKind::X, Some(2.0))]))),
        Some(&UnitsInput::Keyed(BTreeMap::from([(
            AxisKind::X,
            Some("pixel".to_string()),
        )]))),
    );
    assert_eq!(spacing, BTreeMap::from([(AxisKind::X, 2.0)]));
    assert!(units.is_empty());
}

#[test]
fn test_merge_spacing_positional_and_inference() {
    let (spacing, units) = merge_spacing(
        &axes("zyx"),
        Some(&SpacingInput::Positional(vec![Some(0.15), Some(1.56), Some(0.05)])),
        Some(&UnitsInput::Positional(vec![Some("mm".to_string())])),
    );
    assert_eq!(spacing.len(), 3);
    assert_eq!(spacing[&AxisKind::Y], 1.56);
    assert_eq!(units[&AxisKind::Z], "mm");
    assert_eq!(units[&AxisKind::Y], "mm");
    assert_eq!(units[&AxisKind::X], "mm");

    // Disagreeing spatial units get no fallback
    let (_, units) = merge_spacing(
        &axes("zyx"),
        Some(&SpacingInput::Positional(vec![Some(0.15), Some(1.56), Some(0.05)])),
        Some(&UnitsInput::Keyed(BTreeMap::from([
            (AxisKind::Z, Some("cm".to_string())),
            (AxisKind::X, Some("nm".to_string())),
        ]))),
    );
    assert_eq!(units.get(&AxisKind::Y), None);
    assert_eq!(units[&AxisKind::Z], "cm");

    // Units without spacing are dropped, NaN spacing is dropped, c never has spacing
    let (spacing, units) = merge_spacing(
        &axes("tczyx"),
        Some(&SpacingInput::Keyed(BTreeMap::from([
            (AxisKind::Channel, Some(3.0)),
            (AxisKind::Z, Some(f64::NAN)),
            (AxisKind::Time, Some(0.5)),
        ]))),
        Some(&UnitsInput::Positional(vec![
            Some("s".to_string()),
            Some("um".to_string()),
            Some("um".to_string()),
            Some("um".to_string()),
        ])),
    );
    assert_eq!(spacing, BTreeMap::from([(AxisKind::Time, 0.5)]));
    assert_eq!(units, BTreeMap::from([(AxisKind::Time, "s".to_string())]));

    // "sec" counts as no unit; a time spacing of 1 survives anyway
    let (spacing, units) = merge_spacing(
        &axes("tyx"),
        Some(&SpacingInput::Positional(vec![Some(1.0), None, None])),
        Some(&UnitsInput::Positional(vec![Some("sec".to_string())])),
    );
    assert!(units.is_empty());
    assert_eq!(spacing, BTreeMap::from([(AxisKind::Time, 1.0)]));
}

fn raw(shape: &[usize], axes_str: &str) -> RawDiscovery {
    let mut raw = RawDiscovery::new(DType::Uint16, ShapeInput::Ordered(shape.to_vec()));
    raw.axes = Some(axes(axes_str));
    raw
}

#[test]
fn test_resolve_reorders_spacing_and_units() {
    let canonical = Axes::canonical();

    // zcyx, positional spacing, keyed units
    let mut input = raw(&[8, 32, 128, 256], "zcyx");
    input.spacing = Some(SpacingInput::Positional(vec![Some(0.15), Some(1.56), Some(0.05)]));
    input.spacing_units = Some(UnitsInput::Keyed(BTreeMap::from([
        (AxisKind::Z, Some("cm".to_string())),
        (AxisKind::X, Some("nm".to_string())),
    ])));
    let (metadata, shape) =
        resolve(&input, &MetadataOverrides::default(), Some(&canonical)).expect("Failed to resolve");
    assert_eq!(metadata.axes.to_string(), "czyx");
    assert_eq!(shape, vec![32, 8, 128, 256]);
    assert_eq!(metadata.original_axes.to_string(), "zcyx");
    assert_eq!(metadata.original_shape, vec![8, 32, 128, 256]);
    assert_eq!(metadata.spacing[&AxisKind::Z], 0.15);
    assert_eq!(metadata.spacing_units.get(&AxisKind::Y), None);
    assert_eq!(metadata.spacing_units[&AxisKind::X], "nm");

    // zcxy, positional spacing aligned with z, x, y
    let mut input = raw(&[8, 32, 128, 256], "zcxy");
    input.spacing = Some(SpacingInput::Positional(vec![Some(0.15), Some(1.56), Some(0.05)]));
    input.spacing_units = Some(UnitsInput::Positional(vec![Some("cm".to_string())]));
    let (metadata, shape) =
        resolve(&input, &MetadataOverrides::default(), Some(&canonical)).expect("Failed to resolve");
    assert_eq!(shape, vec![32, 8, 256, 128]);
    assert_eq!(metadata.spacing[&AxisKind::Z], 0.15);
    assert_eq!(metadata.spacing[&AxisKind::Y], 0.05);
    assert_eq!(metadata.spacing[&AxisKind::X], 1.56);
    assert!(metadata.spacing_units.values().all(|u| u == "cm"));
    assert_eq!(metadata.spacing_units.len(), 3);

    // zctxy, short spacing tuple, full unit tuple
    let mut input = raw(&[2, 8, 32, 128, 256], "zctxy");
    input.spacing = Some(SpacingInput::Positional(vec![Some(0.34), Some(0.56), Some(0.78)]));
    input.spacing_units = Some(UnitsInput::Positional(
        ["nm", "ms", "mm", "cm"].iter().map(|u| Some(u.to_string())).collect(),
    ));
    let (metadata, shape) =
        resolve(&input, &MetadataOverrides::default(), Some(&canonical)).expect("Failed to resolve");
    assert_eq!(metadata.axes.to_string(), "tczyx");
    assert_eq!(shape, vec![32, 8, 2, 256, 128]);
    assert_eq!(metadata.spacing.get(&AxisKind::Time), Some(&0.34));
    assert_eq!(metadata.spacing.get(&AxisKind::Z), None);
    assert_eq!(metadata.spacing.get(&AxisKind::Y), Some(&0.78));
    assert_eq!(metadata.spacing.get(&AxisKind::X), Some(&0.56));
    assert_eq!(metadata.spacing_units[&AxisKind::Time], "ms");
    assert_eq!(metadata.spacing_units[&AxisKind::Y], "cm");
    assert_eq!(metadata.spacing_units[&AxisKind::X], "mm");
    assert_eq!(metadata.spacing_units.get(&AxisKind::Z), None);
}

#[test]
fn test_resolve_native_order_and_shape_forms() {
    let input = raw(&[4, 2, 8], "zcx");
    let (metadata, shape) =
        resolve(&input, &MetadataOverrides::default(), None).expect("Failed to resolve");
    assert_eq!(metadata.axes.to_string(), "zcx");
    assert_eq!(shape, vec![4, 2, 8]);

    let mut keyed = RawDiscovery::new(
        DType::Float32,
        ShapeInput::Keyed(BTreeMap::from([
            (AxisKind::Z, 4),
            (AxisKind::Y, 5),
            (AxisKind::X, 6),
            (AxisKind::Channel, 9),
        ])),
    );
    keyed.axes = Some(axes("xyz"));
    let (metadata, shape) = resolve(&keyed, &MetadataOverrides::default(), Some(&Axes::canonical()))
        .expect("Failed to resolve keyed shape");
    assert_eq!(metadata.axes.to_string(), "zyx");
    assert_eq!(shape, vec![4, 5, 6]);
    assert_eq!(metadata.original_shape, vec![6, 5, 4]);

    keyed.axes = Some(axes("tyx"));
    assert!(matches!(
        resolve(&keyed, &MetadataOverrides::default(), None),
        Err(NdImageError::AxisVocabulary { .. })
    ));

    let inferred = RawDiscovery::new(DType::Uint8, ShapeInput::Ordered(vec![16, 16, 3]));
    let (metadata, _) = resolve(&inferred, &MetadataOverrides::default(), Some(&Axes::canonical()))
        .expect("Failed to resolve inferred axes");
    assert_eq!(metadata.original_axes.to_string(), "yxc");
    assert_eq!(metadata.axes.to_string(), "cyx");

    let mismatched = raw(&[4, 4], "zyx");
    assert!(matches!(
        resolve(&mismatched, &MetadataOverrides::default(), None),
        Err(NdImageError::AxisVocabulary { .. })
    ));

    let partial_order = raw(&[2, 4, 4], "cyx");
    assert!(matches!(
        resolve(&partial_order, &MetadataOverrides::default(), Some(&axes("zyx"))),
        Err(NdImageError::AxisReorder { .. })
    ));
}

#[test]
fn test_resolve_overrides_take_precedence() {
    let mut input = raw(&[3, 10, 12], "zyx");
    input.spacing = Some(SpacingInput::Positional(vec![Some(1.5), Some(0.5), Some(0.5)]));
    input.spacing_units = Some(UnitsInput::Positional(vec![Some("um".to_string())]));
    input.header = serde_json::json!({"source": "backend", "version": 1});

    let overrides = MetadataOverrides {
        axes: Some(axes("tyx")),
        spacing: Some(SpacingInput::Keyed(BTreeMap::from([(AxisKind::X, Some(0.25))]))),
        header: Some(serde_json::json!({"source": "caller"})),
        ..MetadataOverrides::default()
    };
    let (metadata, shape) =
        resolve(&input, &overrides, Some(&Axes::canonical())).expect("Failed to resolve");
    assert_eq!(metadata.original_axes.to_string(), "zyx");
    assert_eq!(metadata.source_axes.to_string(), "tyx");
    assert_eq!(metadata.axes.to_string(), "tyx");
    assert_eq!(shape, vec![3, 10, 12]);
    assert_eq!(metadata.spacing[&AxisKind::Time], 1.5);
    assert_eq!(metadata.spacing[&AxisKind::Y], 0.5);
    assert_eq!(metadata.spacing[&AxisKind::X], 0.25);
    assert_eq!(metadata.spacing_units.get(&AxisKind::Time), None);
    assert_eq!(metadata.spacing_units[&AxisKind::Y], "um");
    assert_eq!(metadata.header["source"], "caller");
    assert_eq!(metadata.header["version"], 1);

    let bad = MetadataOverrides {
        axes: Some(axes("yx")),
        ..MetadataOverrides::default()
    };
    assert!(matches!(
        resolve(&input, &bad, None),
        Err(NdImageError::AxisVocabulary { .. })
    ));
}

#[test]
fn test_resolve_coordinates() {
    let mut input = raw(&[2, 3, 4], "czx");
    input.spacing = Some(SpacingInput::Positional(vec![Some(2.0), Some(0.5)]));
    let mut coords = CoordsRecord::new();
    coords.insert(AxisKind::Channel, vec![Coord::from("dapi"), Coord::from("gfp")]);
    coords.insert(AxisKind::Z, vec![Coord::Float(0.0), Coord::Float(1.0), Coord::Float(5.0)]);
    coords.insert(AxisKind::Time, vec![Coord::Int(0)]);
    coords.insert(AxisKind::X, vec![]);
    input.coords = Some(coords);

    let (metadata, _) = resolve(&input, &MetadataOverrides::default(), Some(&Axes::canonical()))
        .expect("Failed to resolve");
    assert_eq!(metadata.coords.len(), 2);
    assert_eq!(metadata.coords[&AxisKind::Channel][1], Coord::from("gfp"));
    assert_eq!(metadata.spacing.get(&AxisKind::Z), None);
    assert_eq!(metadata.spacing[&AxisKind::X], 0.5);

    let mut wrong = raw(&[2, 3, 4], "czx");
    wrong.coords = Some(CoordsRecord::from([(
        AxisKind::Channel,
        vec![Coord::from("dapi")],
    )]));
    assert!(matches!(
        resolve(&wrong, &MetadataOverrides::default(), None),
        Err(NdImageError::UnsupportedShape(_))
    ));
}

#[test]
fn test_natural_sort_order() {
    let mut names: Vec<String> = (1..=10).map(|i| format!("z{}", i)).collect();
    names.reverse();
    names.sort_by(|a, b| natural_cmp(a, b));
    let expected: Vec<String> = (1..=10).map(|i| format!("z{}", i)).collect();
    assert_eq!(names, expected);
    assert_eq!(natural_cmp("File2", "file17"), Ordering::Less);
}

#[test]
fn test_labeled_image_accessors() {
    let image = LabeledImage::new(ramp(&[2, 4, 6]), "czx")
        .expect("Failed to build image")
        .with_spacing(SpacingInput::Positional(vec![Some(3.0), Some(0.5)]))
        .with_units(UnitsInput::Positional(vec![Some("um".to_string())]))
        .with_coords(AxisKind::Channel, vec![Coord::from("a"), Coord::from("b")])
        .expect("Failed to set coords");
    assert_eq!(image.dtype(), DType::Uint32);
    assert_eq!(image.spacing(AxisKind::Z), Some(3.0));
    assert_eq!(image.spacing_unit(AxisKind::Z), Some("um"));
    assert_eq!(image.spacing_tzyx(), vec![Some(3.0), Some(0.5)]);
    assert_eq!(image.coords(AxisKind::Channel).map(|c| c.len()), Some(2));

    let moved = image.clone().reorder(&axes("zxc")).expect("Failed to reorder");
    assert_eq!(moved.shape(), &[4, 6, 2]);
    assert_eq!(moved.axes().to_string(), "zxc");
    assert_eq!(moved.spacing(AxisKind::X), Some(0.5));

    assert!(image
        .clone()
        .with_coords(AxisKind::Channel, vec![Coord::Int(0)])
        .is_err());
    assert!(LabeledImage::new(ramp(&[2, 4]), "zyx").is_err());

    let mut dataset = Dataset::new();
    dataset.insert("one", image.clone());
    assert!(dataset.clone().into_single().is_ok());
    dataset.insert("two", image);
    assert_eq!(dataset.names().collect::<Vec<_>>(), vec!["one", "two"]);
    assert!(matches!(
        dataset.into_single(),
        Err(NdImageError::UnsupportedShape(_))
    ));
}

#[test]
fn test_merge_spacing_longer_positional_sequence() {
    let units = ["um", "um", "um", "s"].iter().map(|u| Some(u.to_string())).collect();
    let (spacing, units) = merge_spacing(
        &axes("zyx"),
        Some(&SpacingInput::Positional(vec![Some(2.0), Some(0.5), Some(0.25), Some(9.0)])),
        Some(&UnitsInput::Positional(units)),
    );
    assert_eq!(
        spacing,
        BTreeMap::from([(AxisKind::Z, 2.0), (AxisKind::Y, 0.5), (AxisKind::X, 0.25)])
    );
    assert_eq!(
        units,
        BTreeMap::from([
            (AxisKind::Z, "um".to_string()),
            (AxisKind::Y, "um".to_string()),
            (AxisKind::X, "um".to_string()),
        ])
    );
}
