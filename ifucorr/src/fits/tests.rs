use super::*;

fn small_cube() -> Cube {
    let dims = CubeDims::new(3, 2, 4);
    let flux: Vec<f32> = (0..dims.len()).map(|i| i as f32 * 0.5).collect();
    let mut variance = vec![1.0; dims.len()];
    variance[5] = f32::NAN;
    Cube::new(dims, flux, variance, RotationAngle::Deg270).unwrap()
}

#[test]
fn test_cube_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cube.fits");
    let layout = CubeLayout::default();
    let cube = small_cube();

    write_cube(&path, &cube, &layout).unwrap();
    let loaded = read_cube(&path, &layout).unwrap();

    assert_eq!(loaded.dims(), cube.dims());
    assert_eq!(loaded.rotation(), RotationAngle::Deg270);
    assert_eq!(loaded.flux(), cube.flux());
    assert!(loaded.variance()[5].is_nan());
    assert_eq!(loaded.variance()[6], 1.0);
}

#[test]
fn test_unsupported_rotation_rejected_on_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cube.fits");
    let layout = CubeLayout::default();
    let dims = CubeDims::new(2, 2, 2);

    write_cube_with_angle(&path, dims, &[1.0; 8], &[1.0; 8], 200.0, &layout).unwrap();
    let err = read_cube(&path, &layout).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_missing_file_is_artifact_missing() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_image(&dir.path().join("absent.fits")).unwrap_err();
    assert!(matches!(err, Error::ArtifactMissing { .. }));
}

#[test]
fn test_image_roundtrip_skips_empty_primary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image.fits");
    let image = Buffer2::from_fn(5, 3, |x, y| (x + 10 * y) as f32);

    write_images(&path, &[("IMAGE", &image)]).unwrap();
    assert_eq!(read_image(&path).unwrap(), image);
    assert_eq!(read_named_image(&path, "IMAGE").unwrap(), image);
}

#[test]
fn test_table_keeps_nan_cells() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.fits");
    let table = Buffer2::new(2, 2, vec![1.0, f32::NAN, 0.5, 2.0]);
    let other = Buffer2::new(1, 1, vec![7.0]);

    write_images(&path, &[("NORMALIZED", &table), ("CENTERS", &other)]).unwrap();
    let loaded = read_named_image(&path, "NORMALIZED").unwrap();
    assert_eq!(loaded[0], 1.0);
    assert!(loaded[1].is_nan());
    assert_eq!(read_named_image(&path, "CENTERS").unwrap()[0], 7.0);
}

#[test]
fn test_mask_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mask.fits");
    let mask = BitBuffer2::from_fn(70, 3, |x, y| (x + y) % 3 == 0);

    write_mask(&path, "MASK", &mask).unwrap();
    assert_eq!(read_mask(&path, "MASK").unwrap(), mask);
}

#[test]
fn test_provenance_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pixtable.fits");
    let samples = vec![
        ProvenanceSample {
            x: 0,
            y: 1,
            unit: 3,
            origin: SampleOrigin::Slice(14),
        },
        ProvenanceSample {
            x: 4,
            y: 2,
            unit: 24,
            origin: SampleOrigin::Slice(48),
        },
    ];

    write_provenance(&path, PROVENANCE_EXTNAME, &samples).unwrap();
    assert_eq!(read_provenance(&path, PROVENANCE_EXTNAME).unwrap(), samples);
}
