use nd_image_io::prelude::*;
use nd_image_io::backends::npy::sidecar_path;
use nd_image_io::backends::NpySource;
use nd_image_io::{split_extension, PartitionPlan};
use ndarray::{ArrayD, Axis, IxDyn};
use ndarray_npy::write_npy;
use std::path::Path;
use tempfile::tempdir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn axes(s: &str) -> Axes {
    s.parse().expect("Failed to parse axes")
}

fn ramp_u16(shape: &[usize]) -> ArrayD<u16> {
    let n: usize = shape.iter().product();
    ArrayD::from_shape_vec(IxDyn(shape), (0..n).map(|v| v as u16).collect())
        .expect("Failed to build ramp")
}

fn uri(path: &Path) -> &str {
    path.to_str().expect("Failed to convert path to str")
}

#[test]
fn test_partitions_reassemble_exactly() {
    let data = ramp_u16(&[2, 3, 4, 5, 6]);
    let image = LabeledImage::new(data.clone(), "tczyx").expect("Failed to build image");

    let parts = partition(&image, &axes("zyx"), "out/base.tif")
        .expect("Failed to plan partitions")
        .collect::<Result<Vec<_>>>()
        .expect("Failed to build partitions");
    assert_eq!(parts.len(), 6);

    let mut rebuilt = ArrayD::<u16>::zeros(IxDyn(&[2, 3, 4, 5, 6]));
    for part in &parts {
        assert!(part.data.is_view());
        assert_eq!(part.data.shape(), &[4, 5, 6]);
        assert_eq!(part.axes.to_string(), "zyx");
        let t = part.outer[0].1.as_int().expect("integer t") as usize;
        let c = part.outer[1].1.as_int().expect("integer c") as usize;
        assert_eq!(part.path, format!("out/base.T_{}.C_{}.tif", t, c));
        let block = part
            .data
            .to_pixels()
            .into_array::<u16>()
            .expect("Failed to take u16 block");
        rebuilt
            .index_axis_mut(Axis(0), t)
            .index_axis_move(Axis(0), c)
            .assign(&block);
    }
    assert_eq!(rebuilt, data);

    let order: Vec<&str> = parts.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(
        order,
        vec![
            "out/base.T_0.C_0.tif",
            "out/base.T_0.C_1.tif",
            "out/base.T_0.C_2.tif",
            "out/base.T_1.C_0.tif",
            "out/base.T_1.C_1.tif",
            "out/base.T_1.C_2.tif",
        ]
    );
}

#[test]
fn test_partition_with_transposed_inner_axes() {
    let data = ramp_u16(&[2, 3, 4]);
    let image = LabeledImage::new(data.clone(), "zyx").expect("Failed to build image");
    let parts = partition(&image, &axes("xy"), "plane.npy")
        .expect("Failed to plan partitions")
        .collect::<Result<Vec<_>>>()
        .expect("Failed to build partitions");
    assert_eq!(parts.len(), 2);
    for (z, part) in parts.iter().enumerate() {
        assert!(!part.data.is_view());
        assert_eq!(part.data.shape(), &[4, 3]);
        let block = part.data.to_pixels().into_array::<u16>().expect("u16 block");
        assert_eq!(block[[3, 1]], data[[z, 1, 3]]);
        assert_eq!(part.path, format!("plane.Z_{}.npy", z));
    }

    // Inner axes covering everything give a single, unsuffixed partition
    let whole = partition(&image, &Axes::canonical(), "whole.npy").expect("Failed to plan");
    assert_eq!(whole.len(), 1);
    assert_eq!(whole.plan().paths(), vec!["whole.npy".to_string()]);

    assert!(matches!(
        partition(&image, &axes("c"), "none.npy"),
        Err(NdImageError::UnsupportedShape(_))
    ));
}

#[test]
fn test_partition_path_naming() {
    let image = LabeledImage::new(ramp_u16(&[12, 2, 3]), "tyx").expect("Failed to build image");
    let plan = PartitionPlan::new(&image.metadata, &axes("zyx"), "/data/run.ome.tif")
        .expect("Failed to plan");
    let paths = plan.paths();
    assert_eq!(paths.len(), 12);
    assert_eq!(paths[0], "/data/run.T_00.ome.tif");
    assert_eq!(paths[11], "/data/run.T_11.ome.tif");

    let labeled = LabeledImage::new(ramp_u16(&[2, 2, 3]), "cyx")
        .expect("Failed to build image")
        .with_coords(AxisKind::Channel, vec![Coord::from("dapi"), Coord::from("gfp")])
        .expect("Failed to set coords");
    let plan = PartitionPlan::new(&labeled.metadata, &axes("yx"), "cells.tif")
        .expect("Failed to plan")
        .with_variable("nuclei");
    assert_eq!(
        plan.paths(),
        vec![
            "cells.var_nuclei.C_dapi.tif".to_string(),
            "cells.var_nuclei.C_gfp.tif".to_string()
        ]
    );

    assert_eq!(split_extension("a/b.c/stack.nii.gz"), ("a/b.c/stack", ".nii.gz"));
    assert_eq!(split_extension("a/b.c/stack.tif"), ("a/b.c/stack", ".tif"));
    assert_eq!(split_extension("a/b.c/stack"), ("a/b.c/stack", ""));
    assert_eq!(split_extension("archive/.hidden"), ("archive/.hidden", ""));
}

#[test]
fn test_save_tzyx_to_tiff_splits_time() {
    init_logging();
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let n = 2 * 8 * 16 * 32;
    let data = ArrayD::from_shape_vec(
        IxDyn(&[2, 8, 16, 32]),
        (0..n).map(|v| (v % 251) as u8).collect(),
    )
    .expect("Failed to build array");
    let image = LabeledImage::new(data.clone(), "tzyx").expect("Failed to build image");

    let out = temp_dir.path().join("out.tif");
    let written = imsave(&image, uri(&out), &SaveOptions::default()).expect("Failed to save");
    assert_eq!(
        written,
        vec![
            temp_dir.path().join("out.T_0.tif"),
            temp_dir.path().join("out.T_1.tif")
        ]
    );

    for (t, path) in written.iter().enumerate() {
        let loaded = imload(uri(path), None).expect("Failed to load partition file");
        assert_eq!(loaded.axes().to_string(), "zyx");
        assert_eq!(loaded.shape(), &[8, 16, 32]);
        assert_eq!(loaded.dtype(), DType::Uint8);
        let pixels = loaded.data.into_array::<u8>().expect("u8 pixels");
        assert_eq!(pixels, data.index_axis(Axis(0), t).to_owned());
    }

    // Single pages come back as yx, and one page can be read on its own
    let plane = imload(uri(&written[1]), Some(3)).expect("Failed to load page");
    assert_eq!(plane.axes().to_string(), "yx");
    let plane = plane.data.into_array::<u8>().expect("u8 pixels");
    assert_eq!(
        plane,
        data.index_axis(Axis(0), 1).index_axis(Axis(0), 3).to_owned()
    );
}

#[test]
fn test_tiff_save_rejects_unsupported_input() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let image = LabeledImage::new(ramp_u16(&[2, 3, 4]), "cyx").expect("Failed to build image");

    let bad_inner = imsave(
        &image,
        uri(&temp_dir.path().join("bad.tif")),
        &SaveOptions::with_inner_axes(axes("cyx")),
    );
    assert!(matches!(bad_inner, Err(NdImageError::UnsupportedShape(_))));

    let bad_format = imsave(&image, uri(&temp_dir.path().join("bad.png")), &SaveOptions::default());
    assert!(matches!(bad_format, Err(NdImageError::UnsupportedFormat { .. })));

    let signed = LabeledImage::new(ArrayD::<i16>::zeros(IxDyn(&[3, 4])), "yx")
        .expect("Failed to build image");
    let result = imsave(&signed, uri(&temp_dir.path().join("signed.tif")), &SaveOptions::default());
    assert!(matches!(result, Err(NdImageError::Generic(_))));
}

#[test]
fn test_npy_round_trip_with_sidecar() -> Result<()> {
    init_logging();
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let n = 2 * 3 * 4 * 5;
    let data = ArrayD::from_shape_vec(IxDyn(&[2, 3, 4, 5]), (0..n).map(|v| v as f32 * 0.5).collect())
        .expect("Failed to build array");
    let image = LabeledImage::new(data.clone(), "czyx")?
        .with_spacing(SpacingInput::Positional(vec![Some(2.0), Some(0.5), Some(0.5)]))
        .with_units(UnitsInput::Positional(vec![Some("um".to_string())]))
        .with_coords(AxisKind::Channel, vec![Coord::from("dapi"), Coord::from("gfp")])?;

    let path = temp_dir.path().join("img.npy");
    let written = imsave(&image, uri(&path), &SaveOptions::default())?;
    assert_eq!(written, vec![path.clone()]);
    assert!(sidecar_path(&path).is_file());

    let loaded = imload(uri(&path), None)?;
    assert_eq!(loaded.axes().to_string(), "czyx");
    assert_eq!(loaded.shape(), &[2, 3, 4, 5]);
    assert_eq!(loaded.dtype(), DType::Float32);
    assert_eq!(loaded.metadata.spacing, image.metadata.spacing);
    assert_eq!(loaded.spacing_unit(AxisKind::Y), Some("um"));
    assert_eq!(loaded.coords(AxisKind::Channel), image.coords(AxisKind::Channel));
    assert_eq!(loaded.uri.as_deref(), Some(uri(&path)));
    assert_eq!(loaded.metadata.header["history"].as_array().map(Vec::len), Some(1));
    assert_eq!(loaded.data.clone().into_array::<f32>()?, data);

    // History accumulates across saves
    let again = temp_dir.path().join("again.npy");
    imsave(&loaded, uri(&again), &SaveOptions::default())?;
    let reloaded = imload(uri(&again), None)?;
    assert_eq!(reloaded.metadata.header["history"].as_array().map(Vec::len), Some(2));

    let gfp = imload(uri(&path), Some(1))?;
    assert_eq!(gfp.axes().to_string(), "zyx");
    assert_eq!(gfp.coords(AxisKind::Channel), None);
    assert_eq!(gfp.spacing(AxisKind::Z), Some(2.0));
    assert_eq!(gfp.data.into_array::<f32>()?, data.index_axis(Axis(0), 1).to_owned());

    assert!(matches!(
        imload(uri(&path), Some(2)),
        Err(NdImageError::PartitionOutOfRange {
            index: 2,
            npartitions: 2
        })
    ));
    Ok(())
}

#[test]
fn test_npy_without_sidecar_infers_axes() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp dir");

    let rgb_path = temp_dir.path().join("rgb.npy");
    write_npy(&rgb_path, &ArrayD::<u8>::zeros(IxDyn(&[4, 5, 3]))).expect("Failed to write npy");
    let rgb = imload(uri(&rgb_path), None)?;
    assert_eq!(rgb.metadata.original_axes.to_string(), "yxc");
    assert_eq!(rgb.axes().to_string(), "cyx");
    assert_eq!(rgb.shape(), &[3, 4, 5]);

    let stack_path = temp_dir.path().join("stack.npy");
    write_npy(&stack_path, &ramp_u16(&[6, 4, 5])).expect("Failed to write npy");
    let mut source = NpySource::new(&stack_path, SourceOptions::default().with_axes(axes("tyx")));
    let discovery = source.discover()?;
    assert_eq!(discovery.metadata.axes.to_string(), "tyx");
    assert_eq!(discovery.metadata.original_axes.to_string(), "zyx");
    assert_eq!(discovery.npartitions, 6);
    let frame = load_image(&mut source, Some(2))?;
    assert_eq!(frame.axes().to_string(), "yx");
    assert_eq!(frame.shape(), &[4, 5]);

    let mut native = NpySource::new(
        &stack_path,
        SourceOptions::native_order().with_axes(axes("xty")),
    );
    let discovery = native.discover()?;
    assert_eq!(discovery.metadata.axes.to_string(), "xty");
    assert_eq!(discovery.shape, vec![6, 4, 5]);
    let mut canonical = NpySource::new(&stack_path, SourceOptions::default().with_axes(axes("xty")));
    let image = load_image(&mut canonical, None)?;
    assert_eq!(image.axes().to_string(), "tyx");
    assert_eq!(image.shape(), &[4, 5, 6]);
    Ok(())
}

#[test]
fn test_dataset_saving_names_variables() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let nuclei = LabeledImage::new(ramp_u16(&[2, 3]), "yx")?;
    let membrane = LabeledImage::new(ramp_u16(&[2, 3]), "yx")?;

    let single = Dataset::from(nuclei.clone());
    let base = temp_dir.path().join("single.npy");
    assert_eq!(
        imsave_dataset(&single, uri(&base), &SaveOptions::default())?,
        vec![base.clone()]
    );

    let mut dataset = Dataset::new();
    dataset.insert("nuclei", nuclei);
    dataset.insert("membrane", membrane);
    let written = imsave_dataset(
        &dataset,
        uri(&temp_dir.path().join("set.npy")),
        &SaveOptions::default(),
    )?;
    assert_eq!(
        written,
        vec![
            temp_dir.path().join("set.var_nuclei.npy"),
            temp_dir.path().join("set.var_membrane.npy"),
        ]
    );
    assert!(written.iter().all(|p| p.is_file()));
    Ok(())
}

#[test]
fn test_nested_output_directories_are_created() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let image = LabeledImage::new(ramp_u16(&[2, 3, 4]), "cyx")?;
    let target = temp_dir.path().join("nested").join("deeper").join("out.tif");
    let written = imsave(&image, uri(&target), &SaveOptions::default())?;
    assert_eq!(written.len(), 2);
    assert!(temp_dir.path().join("nested/deeper/out.C_1.tif").is_file());
    Ok(())
}

#[test]
fn test_autodetect_rejects_unknown_formats() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    assert!(matches!(
        autodetect("volume.nrrd", SourceOptions::default()),
        Err(NdImageError::UnsupportedFormat { .. })
    ));
    let zarr = temp_dir.path().join("store.zarr");
    std::fs::create_dir(&zarr).expect("Failed to create dir");
    assert!(matches!(
        autodetect(uri(&zarr), SourceOptions::default()),
        Err(NdImageError::UnsupportedFormat { .. })
    ));
    assert!(autodetect(uri(temp_dir.path()), SourceOptions::default()).is_ok());

    let err = imload(uri(&temp_dir.path().join("missing.npy")), None).unwrap_err();
    assert!(matches!(err, NdImageError::IoError(_)));
}

#[test]
fn test_discovery_serializes_to_json() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let image = LabeledImage::new(ramp_u16(&[3, 4, 5]), "zyx")?
        .with_spacing(SpacingInput::Positional(vec![Some(1.0), Some(0.25), Some(0.25)]))
        .with_units(UnitsInput::Positional(vec![Some("um".to_string())]));
    let path = temp_dir.path().join("vol.npy");
    imsave(&image, uri(&path), &SaveOptions::default())?;

    let mut source = autodetect(uri(&path), SourceOptions::default())?;
    let discovery = source.discover()?;
    let json = serde_json::to_value(&discovery)?;
    assert_eq!(json["dtype"], "uint16");
    assert_eq!(json["metadata"]["axes"], "zyx");
    assert_eq!(json["metadata"]["spacing"]["y"], 0.25);
    assert_eq!(json["metadata"]["spacing_units"]["z"], "um");
    assert_eq!(json["npartitions"], 3);
    source.close();

    // Discovery stays available after close
    assert_eq!(source.discover()?.shape, vec![3, 4, 5]);
    Ok(())
}

/// Write a version 1.0 `.npy` file of big-endian float32 values.
fn write_big_endian_f32(path: &Path, rows: usize, cols: usize, values: &[f32]) {
    let dict = format!(
        "{{'descr': '>f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        rows, cols
    );
    let padding = (64 - (10 + dict.len() + 1) % 64) % 64;
    let header = format!("{}{}\n", dict, " ".repeat(padding));
    let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for value in values {
        bytes.extend_from_slice(&value.to_be_bytes());
    }
    std::fs::write(path, bytes).expect("Failed to write npy file");
}

#[test]
fn test_big_endian_npy_is_discovered() -> Result<()> {
    init_logging();
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().join("be.npy");
    let values: Vec<f32> = (0..6).map(|v| v as f32 * 0.5).collect();
    write_big_endian_f32(&path, 2, 3, &values);

    let mut source = NpySource::new(&path, SourceOptions::default());
    let discovery = source.discover()?;
    assert_eq!(discovery.dtype, DType::Float32);
    assert_eq!(discovery.shape, vec![2, 3]);
    assert_eq!(discovery.metadata.axes.to_string(), "yx");

    let image = imload(uri(&path), None)?;
    let array = image.data.into_array::<f32>()?;
    assert_eq!(array.iter().copied().collect::<Vec<_>>(), values);
    Ok(())
}

#[test]
fn test_saved_directory_loads_back() -> Result<()> {
    init_logging();
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let data = ramp_u16(&[2, 4, 5]);
    let image = LabeledImage::new(data.clone(), "tyx")?;
    let options = SaveOptions {
        inner_axes: Some(axes("yx")),
    };

    let target = temp_dir.path().join("out.npy");
    let written = imsave(&image, uri(&target), &options)?;
    assert_eq!(written.len(), 2);
    assert!(written.iter().all(|path| sidecar_path(path).is_file()));

    let loaded = imload(uri(temp_dir.path()), None)?;
    assert_eq!(loaded.axes().to_string(), "zyx");
    assert_eq!(loaded.data.into_array::<u16>()?, data);
    Ok(())
}
