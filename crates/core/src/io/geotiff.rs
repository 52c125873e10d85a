//! Single-band GeoTIFF reading/writing via the `tiff` crate
//!
//! Georeferencing is carried by ModelPixelScale (33550), ModelTiepoint (33922)
//! and a minimal GeoKeyDirectory (34735). No-data uses the GDAL_NODATA
//! ASCII tag (42113).

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const TAG_PIXEL_SCALE: u16 = 33550;
const TAG_TIEPOINT: u16 = 33922;
const TAG_GEOKEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

/// Read the first image of a GeoTIFF into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }
    decode_geotiff(File::open(path)?)
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(&buf),
        DecodingResult::F64(buf) => cast_all(&buf),
        DecodingResult::U8(buf) => cast_all(&buf),
        DecodingResult::U16(buf) => cast_all(&buf),
        DecodingResult::U32(buf) => cast_all(&buf),
        DecodingResult::I8(buf) => cast_all(&buf),
        DecodingResult::I16(buf) => cast_all(&buf),
        DecodingResult::I32(buf) => cast_all(&buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    if let Some(epsg) = read_epsg(&mut decoder) {
        raster.set_crs(Some(CRS::from_epsg(epsg)));
    }
    if let Ok(text) = decoder.get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA)) {
        if let Ok(value) = text.trim_end_matches('\0').trim().parse::<f64>() {
            raster.set_nodata(Some(T::from_f64(value)));
        }
    }

    Ok(raster)
}

fn cast_all<S, T>(buf: &[S]) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.iter()
        .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_epsg<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let keys = decoder
        .get_tag_u16_vec(Tag::from_u16_exhaustive(TAG_GEOKEY_DIRECTORY))
        .ok()?;
    // Header is 4 shorts, then (key, location, count, value) entries
    keys.get(4..)?
        .chunks_exact(4)
        .find(|entry| {
            (entry[0] == KEY_PROJECTED_CS_TYPE || entry[0] == KEY_GEOGRAPHIC_TYPE)
                && entry[1] == 0
        })
        .map(|entry| entry[3] as u32)
}

/// Write a Raster to a float32 GeoTIFF file.
///
/// The raster's transform, EPSG code (when known) and no-data value are
/// carried into the output tags.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    encode_geotiff(raster, &mut writer)?;
    writer.flush()?;
    Ok(())
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder =
        TiffEncoder::new(writer).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();
    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_PIXEL_SCALE), &scale[..])
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_TIEPOINT), &tiepoint[..])
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;

    let geokeys = geokey_directory(raster.crs().and_then(|c| c.epsg()));
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_GEOKEY_DIRECTORY), geokeys.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    if let Some(nodata) = raster.nodata().and_then(|v| v.to_f64()) {
        let text = format!("{}", nodata);
        image
            .encoder()
            .write_tag(Tag::Unknown(TAG_GDAL_NODATA), text.as_str())
            .map_err(|e| Error::Other(format!("Cannot write nodata tag: {}", e)))?;
    }

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

/// GeoKeyDirectory with model type, raster type and, when known, the EPSG code
fn geokey_directory(epsg: Option<u32>) -> Vec<u16> {
    let geographic = epsg.map_or(false, |code| (4000..5000).contains(&code));
    let mut entries: Vec<[u16; 4]> = vec![
        [KEY_MODEL_TYPE, 0, 1, if geographic { 2 } else { 1 }],
        [KEY_RASTER_TYPE, 0, 1, 1],
    ];
    if let Some(code) = epsg.and_then(|c| u16::try_from(c).ok()) {
        let key = if geographic {
            KEY_GEOGRAPHIC_TYPE
        } else {
            KEY_PROJECTED_CS_TYPE
        };
        entries.push([key, 0, 1, code]);
    }

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.into_iter().flatten());
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_write_then_read_keeps_georeference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("score.tif");

        let mut raster: Raster<f32> =
            Raster::from_vec((0..12).map(|v| v as f32 * 0.5).collect(), 3, 4).unwrap();
        raster.set_transform(GeoTransform::new(500000.0, 8000000.0, 60.0, -60.0));
        raster.set_crs(Some(CRS::from_epsg(32723)));
        raster.set_nodata(Some(-9999.0));

        write_geotiff(&raster, &path).unwrap();
        let back: Raster<f32> = read_geotiff(&path).unwrap();

        assert_eq!(back.shape(), (3, 4));
        assert_relative_eq!(back.get(2, 3).unwrap(), 5.5);
        assert_relative_eq!(back.transform().origin_x, 500000.0);
        assert_relative_eq!(back.transform().pixel_height, -60.0);
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32723));
        assert_eq!(back.nodata(), Some(-9999.0));
    }

    #[test]
    fn test_nodata_tag_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        let mut scores: Raster<f64> = Raster::filled(2, 2, 0.25);
        scores.set(0, 1, -3.5).unwrap();
        scores.set_nodata(Some(-3.5));
        let tagged = dir.path().join("tagged.tif");
        write_geotiff(&scores, &tagged).unwrap();
        let back: Raster<f64> = read_geotiff(&tagged).unwrap();
        assert_eq!(back.nodata(), Some(-3.5));
        assert_eq!(back.get(0, 1).unwrap(), -3.5);

        scores.set_nodata(None);
        let plain = dir.path().join("plain.tif");
        write_geotiff(&scores, &plain).unwrap();
        let back: Raster<f64> = read_geotiff(&plain).unwrap();
        assert_eq!(back.nodata(), None);
    }

    #[test]
    fn test_geographic_geokeys() {
        let keys = geokey_directory(Some(4326));
        assert_eq!(keys[3], 3);
        assert!(keys.chunks_exact(4).any(|e| e == [KEY_GEOGRAPHIC_TYPE, 0, 1, 4326]));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<Raster<f32>> = read_geotiff(dir.path().join("absent.tif"));
        assert!(matches!(result, Err(Error::MissingFile(_))));
    }
}
