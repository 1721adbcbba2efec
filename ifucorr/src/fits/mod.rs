//! FITS input and output.
//!
//! Cubes live in named image extensions (flux and variance) behind a primary
//! header that carries the rotator angle. 2D products are written as a named
//! image extension after an empty primary HDU.

#[cfg(test)]
mod tests;

use std::path::Path;

use common::bit_buffer2::BitBuffer2;
use common::buffer2::Buffer2;
use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::tables::{ColumnDataType, ColumnDescription};
use fitsio::FitsFile;

use crate::config::CubeLayout;
use crate::cube::{Cube, CubeDims};
use crate::error::{Error, Result};
use crate::geometry::RotationAngle;
use crate::zone::{ProvenanceSample, SampleOrigin};

/// Extension name of provenance tables.
pub const PROVENANCE_EXTNAME: &str = "PROVENANCE";

trait FitsResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> FitsResultExt<T> for fitsio::errors::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|e| Error::fits(path, e))
    }
}

fn content_error(path: &Path, message: impl Into<String>) -> Error {
    Error::FitsContent {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn open(path: &Path) -> Result<FitsFile> {
    if !path.exists() {
        return Err(Error::ArtifactMissing {
            path: path.to_path_buf(),
        });
    }
    FitsFile::open(path).at(path)
}

fn create(path: &Path) -> Result<FitsFile> {
    FitsFile::create(path).overwrite().open().at(path)
}

fn image_shape(hdu: &FitsHdu) -> Option<&[usize]> {
    match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => Some(shape.as_slice()),
        _ => None,
    }
}

// ============================================================================
// Cubes
// ============================================================================

/// Load flux, variance and rotation of a reduced cube.
///
/// Fails on an unsupported rotation before any data is read.
pub fn read_cube(path: &Path, layout: &CubeLayout) -> Result<Cube> {
    let mut fptr = open(path)?;

    let primary = fptr.primary_hdu().at(path)?;
    let angle: f64 = primary.read_key(&mut fptr, &layout.rotation_key).at(path)?;
    let rotation = RotationAngle::from_degrees(angle)?;

    let (flux_dims, flux) = read_cube_extension(&mut fptr, path, &layout.flux_hdu)?;
    let (var_dims, variance) = read_cube_extension(&mut fptr, path, &layout.variance_hdu)?;

    if flux_dims != var_dims {
        return Err(Error::ShapeMismatch {
            what: "variance extension",
            expected: flux_dims.shape(),
            actual: var_dims.shape(),
        });
    }

    Cube::new(flux_dims, flux, variance, rotation)
}

fn read_cube_extension(
    fptr: &mut FitsFile,
    path: &Path,
    extname: &str,
) -> Result<(CubeDims, Vec<f32>)> {
    let hdu = fptr.hdu(extname).at(path)?;
    let dims = match image_shape(&hdu) {
        Some(&[nwave, ny, nx]) => CubeDims::new(nx, ny, nwave),
        Some(shape) => {
            return Err(content_error(
                path,
                format!("extension {extname} has {} axes, expected 3", shape.len()),
            ))
        }
        None => {
            return Err(content_error(
                path,
                format!("extension {extname} is not an image"),
            ))
        }
    };
    let data: Vec<f32> = hdu.read_image(fptr).at(path)?;
    Ok((dims, data))
}

/// Write a cube in the layout [`read_cube`] expects.
pub fn write_cube(path: &Path, cube: &Cube, layout: &CubeLayout) -> Result<()> {
    write_cube_with_angle(
        path,
        cube.dims(),
        cube.flux(),
        cube.variance(),
        cube.rotation().degrees(),
        layout,
    )
}

/// Write a cube whose header carries an arbitrary angle. Used to stage raw
/// instrument products.
pub fn write_cube_with_angle(
    path: &Path,
    dims: CubeDims,
    flux: &[f32],
    variance: &[f32],
    angle: f64,
    layout: &CubeLayout,
) -> Result<()> {
    let mut fptr = create(path)?;
    let primary = fptr.primary_hdu().at(path)?;
    primary
        .write_key(&mut fptr, &layout.rotation_key, angle)
        .at(path)?;

    let shape = dims.shape();
    let description = ImageDescription {
        data_type: ImageType::Float,
        dimensions: &shape,
    };
    for (extname, data) in [
        (layout.flux_hdu.as_str(), flux),
        (layout.variance_hdu.as_str(), variance),
    ] {
        let hdu = fptr.create_image(extname, &description).at(path)?;
        hdu.write_image(&mut fptr, data).at(path)?;
    }
    Ok(())
}

// ============================================================================
// 2D images, tables and masks
// ============================================================================

/// Read the first 2D image HDU with data.
pub fn read_image(path: &Path) -> Result<Buffer2<f32>> {
    let mut fptr = open(path)?;
    let mut idx = 0;
    while let Ok(hdu) = fptr.hdu(idx) {
        if let Some(&[height, width]) = image_shape(&hdu) {
            let pixels: Vec<f32> = hdu.read_image(&mut fptr).at(path)?;
            return Ok(Buffer2::new(width, height, pixels));
        }
        idx += 1;
    }
    Err(content_error(path, "no 2D image HDU found"))
}

/// Read a named 2D image extension.
pub fn read_named_image(path: &Path, extname: &str) -> Result<Buffer2<f32>> {
    let mut fptr = open(path)?;
    let hdu = fptr.hdu(extname).at(path)?;
    match image_shape(&hdu) {
        Some(&[height, width]) => {
            let pixels: Vec<f32> = hdu.read_image(&mut fptr).at(path)?;
            Ok(Buffer2::new(width, height, pixels))
        }
        _ => Err(content_error(
            path,
            format!("extension {extname} is not a 2D image"),
        )),
    }
}

/// Write one or more named 2D float extensions.
pub fn write_images(path: &Path, images: &[(&str, &Buffer2<f32>)]) -> Result<()> {
    let mut fptr = create(path)?;
    for (extname, image) in images {
        let shape = [image.height(), image.width()];
        let description = ImageDescription {
            data_type: ImageType::Float,
            dimensions: &shape,
        };
        let hdu = fptr.create_image(*extname, &description).at(path)?;
        hdu.write_image(&mut fptr, image.pixels()).at(path)?;
    }
    Ok(())
}

/// Write a boolean mask as an 8-bit image of zeros and ones.
pub fn write_mask(path: &Path, extname: &str, mask: &BitBuffer2) -> Result<()> {
    let mut fptr = create(path)?;
    let shape = [mask.height(), mask.width()];
    let description = ImageDescription {
        data_type: ImageType::UnsignedByte,
        dimensions: &shape,
    };
    let data: Vec<u8> = mask.iter().map(u8::from).collect();
    let hdu = fptr.create_image(extname, &description).at(path)?;
    hdu.write_image(&mut fptr, &data).at(path)?;
    Ok(())
}

/// Read a mask written by [`write_mask`].
pub fn read_mask(path: &Path, extname: &str) -> Result<BitBuffer2> {
    let mut fptr = open(path)?;
    let hdu = fptr.hdu(extname).at(path)?;
    match image_shape(&hdu) {
        Some(&[height, width]) => {
            let data: Vec<u8> = hdu.read_image(&mut fptr).at(path)?;
            let bits: Vec<bool> = data.iter().map(|&v| v != 0).collect();
            Ok(BitBuffer2::from_slice(width, height, &bits))
        }
        _ => Err(content_error(
            path,
            format!("extension {extname} is not a 2D mask"),
        )),
    }
}

// ============================================================================
// Provenance
// ============================================================================

/// Read provenance samples from a binary table with integer columns
/// `XPOS`, `YPOS`, `IFU` and `SLICE`.
pub fn read_provenance(path: &Path, extname: &str) -> Result<Vec<ProvenanceSample>> {
    let mut fptr = open(path)?;
    let hdu = fptr.hdu(extname).at(path)?;

    let xs: Vec<i32> = hdu.read_col(&mut fptr, "XPOS").at(path)?;
    let ys: Vec<i32> = hdu.read_col(&mut fptr, "YPOS").at(path)?;
    let units: Vec<i32> = hdu.read_col(&mut fptr, "IFU").at(path)?;
    let slices: Vec<i32> = hdu.read_col(&mut fptr, "SLICE").at(path)?;

    let n = xs.len();
    if ys.len() != n || units.len() != n || slices.len() != n {
        return Err(content_error(path, "provenance columns differ in length"));
    }

    // Negative indices map to u32::MAX so that ZoneMapper rejects them.
    let index = |v: i32| u32::try_from(v).unwrap_or(u32::MAX);
    Ok((0..n)
        .map(|i| ProvenanceSample {
            x: xs[i] as i64,
            y: ys[i] as i64,
            unit: index(units[i]),
            origin: SampleOrigin::Slice(index(slices[i])),
        })
        .collect())
}

/// Write provenance samples with slice origins.
pub fn write_provenance(path: &Path, extname: &str, samples: &[ProvenanceSample]) -> Result<()> {
    let mut xs = Vec::with_capacity(samples.len());
    let mut ys = Vec::with_capacity(samples.len());
    let mut units = Vec::with_capacity(samples.len());
    let mut slices = Vec::with_capacity(samples.len());
    for sample in samples {
        let SampleOrigin::Slice(slice) = sample.origin else {
            return Err(content_error(
                path,
                "provenance tables store slice origins only",
            ));
        };
        xs.push(sample.x as i32);
        ys.push(sample.y as i32);
        units.push(sample.unit as i32);
        slices.push(slice as i32);
    }

    let mut fptr = create(path)?;
    let columns = ["XPOS", "YPOS", "IFU", "SLICE"]
        .iter()
        .map(|name| {
            ColumnDescription::new(*name)
                .with_type(ColumnDataType::Int)
                .create()
                .at(path)
        })
        .collect::<Result<Vec<_>>>()?;
    let hdu = fptr.create_table(extname, &columns).at(path)?;
    hdu.write_col(&mut fptr, "XPOS", &xs).at(path)?;
    hdu.write_col(&mut fptr, "YPOS", &ys).at(path)?;
    hdu.write_col(&mut fptr, "IFU", &units).at(path)?;
    hdu.write_col(&mut fptr, "SLICE", &slices).at(path)?;
    Ok(())
}
