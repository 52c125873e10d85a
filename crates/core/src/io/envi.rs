//! ENVI header + raw binary cubes
//!
//! An ENVI dataset is a plain-text `.hdr` describing sample/line/band counts,
//! interleave, data type and byte order, paired with a flat binary file.
//! Only the subset of header keys used by hyperspectral reflectance products
//! is interpreted; unknown keys are ignored.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array3;

use crate::crs::CRS;
use crate::cube::{SpectralCube, DEFAULT_NODATA};
use crate::error::{Error, Result};
use crate::raster::GeoTransform;

/// Sample type codes from the ENVI `data type` key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnviDataType {
    U8,
    I16,
    I32,
    F32,
    F64,
    U16,
}

impl EnviDataType {
    /// Map an ENVI numeric code onto a sample type
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            1 => Ok(Self::U8),
            2 => Ok(Self::I16),
            3 => Ok(Self::I32),
            4 => Ok(Self::F32),
            5 => Ok(Self::F64),
            12 => Ok(Self::U16),
            other => Err(Error::UnsupportedDataType(format!("ENVI data type {}", other))),
        }
    }

    /// ENVI numeric code
    pub fn code(self) -> u32 {
        match self {
            Self::U8 => 1,
            Self::I16 => 2,
            Self::I32 => 3,
            Self::F32 => 4,
            Self::F64 => 5,
            Self::U16 => 12,
        }
    }

    /// Size of one sample in bytes
    pub fn size_bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// Sample ordering within the data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interleave {
    /// Band sequential: (bands, lines, samples)
    Bsq,
    /// Band interleaved by line: (lines, bands, samples)
    Bil,
    /// Band interleaved by pixel: (lines, samples, bands)
    Bip,
}

/// Parsed ENVI header
#[derive(Debug, Clone)]
pub struct EnviHeader {
    /// Columns
    pub samples: usize,
    /// Rows
    pub lines: usize,
    pub bands: usize,
    /// Bytes to skip at the start of the data file
    pub header_offset: u64,
    pub data_type: EnviDataType,
    pub interleave: Interleave,
    /// `true` for big-endian (`byte order = 1`)
    pub big_endian: bool,
    /// `data ignore value`
    pub nodata: Option<f64>,
    /// Band centres in nanometres
    pub wavelengths: Option<Vec<f64>>,
    pub description: Option<String>,
    /// Derived from `map info`
    pub transform: Option<GeoTransform>,
    /// `coordinate system string`
    pub coordinate_system: Option<String>,
}

/// Read and parse an ENVI `.hdr` file
pub fn read_envi_header<P: AsRef<Path>>(path: P) -> Result<EnviHeader> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    parse_envi_header(&text)
}

/// Parse ENVI header text
pub fn parse_envi_header(text: &str) -> Result<EnviHeader> {
    let fields = header_fields(text)?;

    let required = |key: &'static str| -> Result<usize> {
        let raw = fields
            .get(key)
            .ok_or_else(|| Error::Header(format!("missing '{}'", key)))?;
        raw.parse::<usize>()
            .map_err(|_| Error::Header(format!("'{}' is not an integer: {}", key, raw)))
    };

    let samples = required("samples")?;
    let lines = required("lines")?;
    let bands = required("bands")?;

    let header_offset = match fields.get("header offset") {
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| Error::Header(format!("bad header offset: {}", v)))?,
        None => 0,
    };

    let data_type = match fields.get("data type") {
        Some(v) => {
            let code = v
                .parse::<u32>()
                .map_err(|_| Error::Header(format!("bad data type: {}", v)))?;
            EnviDataType::from_code(code)?
        }
        None => return Err(Error::Header("missing 'data type'".into())),
    };

    let interleave = match fields.get("interleave").map(|s| s.to_ascii_lowercase()) {
        None => Interleave::Bsq,
        Some(s) => match s.as_str() {
            "bsq" => Interleave::Bsq,
            "bil" => Interleave::Bil,
            "bip" => Interleave::Bip,
            other => return Err(Error::Header(format!("unknown interleave: {}", other))),
        },
    };

    let big_endian = match fields.get("byte order").map(String::as_str) {
        None | Some("0") => false,
        Some("1") => true,
        Some(other) => return Err(Error::Header(format!("bad byte order: {}", other))),
    };

    let nodata = match fields.get("data ignore value") {
        Some(v) => Some(
            v.parse::<f64>()
                .map_err(|_| Error::Header(format!("bad data ignore value: {}", v)))?,
        ),
        None => None,
    };

    let wavelengths = match fields.get("wavelength") {
        Some(v) => {
            let mut values = parse_list(v)?;
            let units = fields
                .get("wavelength units")
                .map(|u| u.to_ascii_lowercase())
                .unwrap_or_default();
            if units.starts_with("micro") || units == "um" {
                values.iter_mut().for_each(|w| *w *= 1000.0);
            }
            if values.len() != bands {
                return Err(Error::Header(format!(
                    "{} wavelengths for {} bands",
                    values.len(),
                    bands
                )));
            }
            Some(values)
        }
        None => None,
    };

    let transform = match fields.get("map info") {
        Some(v) => parse_map_info(v),
        None => None,
    };

    Ok(EnviHeader {
        samples,
        lines,
        bands,
        header_offset,
        data_type,
        interleave,
        big_endian,
        nodata,
        wavelengths,
        description: fields.get("description").cloned(),
        transform,
        coordinate_system: fields.get("coordinate system string").cloned(),
    })
}

/// Split header text into lowercase keys and raw values, joining `{...}` blocks
fn header_fields(text: &str) -> Result<HashMap<String, String>> {
    let mut lines = text.lines();
    match lines.next() {
        Some(first) if first.trim() == "ENVI" => {}
        _ => return Err(Error::Header("missing ENVI magic line".into())),
    }

    let mut fields = HashMap::new();
    let mut pending: Option<(String, String)> = None;

    for line in lines {
        if let Some((key, mut value)) = pending.take() {
            value.push(' ');
            value.push_str(line.trim());
            if line.contains('}') {
                fields.insert(key, strip_braces(&value));
            } else {
                pending = Some((key, value));
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().to_string();
        if value.starts_with('{') && !value.contains('}') {
            pending = Some((key, value));
        } else {
            fields.insert(key, strip_braces(&value));
        }
    }

    if let Some((key, _)) = pending {
        return Err(Error::Header(format!("unterminated '{{' in '{}'", key)));
    }
    Ok(fields)
}

fn strip_braces(value: &str) -> String {
    value
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim()
        .to_string()
}

fn parse_list(value: &str) -> Result<Vec<f64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| Error::Header(format!("bad list value: {}", s)))
        })
        .collect()
}

/// `map info = {proj, ref_x, ref_y, easting, northing, size_x, size_y, ...}`
fn parse_map_info(value: &str) -> Option<GeoTransform> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() < 7 {
        return None;
    }
    let nums: Vec<f64> = parts[1..7]
        .iter()
        .map(|s| s.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    Some(GeoTransform::from_tie_point(
        nums[0], nums[1], nums[2], nums[3], nums[4], nums[5],
    ))
}

/// Locate the binary file paired with a header.
///
/// Tries `.raw`, `.img`, `.dat`, `.bsq` and the extensionless base name.
pub fn companion_data_path<P: AsRef<Path>>(header_path: P) -> Result<PathBuf> {
    let header_path = header_path.as_ref();
    let base = header_path.with_extension("");
    for ext in ["raw", "img", "dat", "bsq"] {
        let candidate = base.with_extension(ext);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    if base.is_file() {
        return Ok(base);
    }
    Err(Error::MissingFile(base.with_extension("raw")))
}

/// Load an ENVI dataset into a [`SpectralCube`].
///
/// The cube's no-data value is `data ignore value`, or
/// [`DEFAULT_NODATA`] when the header omits it.
pub fn read_envi<P: AsRef<Path>>(header_path: P) -> Result<SpectralCube> {
    let header_path = header_path.as_ref();
    let header = read_envi_header(header_path)?;
    let data_path = companion_data_path(header_path)?;

    let count = sample_count(&header)?;
    let required = (count as u64)
        .checked_mul(header.data_type.size_bytes() as u64)
        .and_then(|n| n.checked_add(header.header_offset))
        .ok_or_else(|| Error::Header("cube size overflows".into()))?;
    let available = data_path.metadata()?.len();
    if available < required {
        return Err(Error::Header(format!(
            "{} holds {} bytes, header describes {}",
            data_path.display(),
            available,
            required
        )));
    }

    let mut reader = BufReader::new(File::open(&data_path)?);
    reader.seek(SeekFrom::Start(header.header_offset))?;

    let samples = if header.big_endian {
        read_samples::<BigEndian, _>(&mut reader, header.data_type, count)?
    } else {
        read_samples::<LittleEndian, _>(&mut reader, header.data_type, count)?
    };

    let (rows, cols, bands) = (header.lines, header.samples, header.bands);
    let cube = match header.interleave {
        Interleave::Bsq => SpectralCube::from_bsq(samples, rows, cols, bands)?,
        Interleave::Bil => {
            let arr = Array3::from_shape_vec((rows, bands, cols), samples)
                .map_err(|e| Error::Other(e.to_string()))?;
            SpectralCube::new(arr.permuted_axes([0, 2, 1]))
        }
        Interleave::Bip => {
            let arr = Array3::from_shape_vec((rows, cols, bands), samples)
                .map_err(|e| Error::Other(e.to_string()))?;
            SpectralCube::new(arr)
        }
    };

    let mut cube = cube
        .with_nodata(header.nodata.unwrap_or(DEFAULT_NODATA))
        .with_crs(header.coordinate_system.clone().map(CRS::from_wkt));
    if let Some(transform) = header.transform {
        cube = cube.with_transform(transform);
    }
    if let Some(wavelengths) = header.wavelengths {
        cube = cube.with_wavelengths(wavelengths)?;
    }

    tracing::debug!(
        "Loaded {} ({} x {} x {} bands, {:?})",
        data_path.display(),
        cols,
        rows,
        bands,
        header.interleave
    );
    Ok(cube)
}

fn sample_count(header: &EnviHeader) -> Result<usize> {
    header
        .samples
        .checked_mul(header.lines)
        .and_then(|n| n.checked_mul(header.bands))
        .ok_or_else(|| {
            Error::Header(format!(
                "{} x {} x {} samples overflows",
                header.samples, header.lines, header.bands
            ))
        })
}

fn read_samples<B: ByteOrder, R: Read>(
    reader: &mut R,
    data_type: EnviDataType,
    count: usize,
) -> Result<Vec<f32>> {
    let samples = match data_type {
        EnviDataType::F32 => {
            let mut buf = vec![0f32; count];
            reader.read_f32_into::<B>(&mut buf)?;
            buf
        }
        EnviDataType::F64 => {
            let mut buf = vec![0f64; count];
            reader.read_f64_into::<B>(&mut buf)?;
            buf.into_iter().map(|v| v as f32).collect()
        }
        EnviDataType::U8 => {
            let mut buf = vec![0u8; count];
            reader.read_exact(&mut buf)?;
            buf.into_iter().map(f32::from).collect()
        }
        EnviDataType::I16 => {
            let mut buf = vec![0i16; count];
            reader.read_i16_into::<B>(&mut buf)?;
            buf.into_iter().map(f32::from).collect()
        }
        EnviDataType::U16 => {
            let mut buf = vec![0u16; count];
            reader.read_u16_into::<B>(&mut buf)?;
            buf.into_iter().map(f32::from).collect()
        }
        EnviDataType::I32 => {
            let mut buf = vec![0i32; count];
            reader.read_i32_into::<B>(&mut buf)?;
            buf.into_iter().map(|v| v as f32).collect()
        }
    };
    Ok(samples)
}

/// Write a cube as a little-endian float32 BSQ pair `<base>.hdr` + `<base>.raw`.
///
/// Returns the header path.
pub fn write_envi<P: AsRef<Path>>(base: P, cube: &SpectralCube) -> Result<PathBuf> {
    let base = base.as_ref();
    let header_path = base.with_extension("hdr");
    let raw_path = base.with_extension("raw");
    let (rows, cols, bands) = cube.shape();

    let mut header = vec![
        "ENVI".to_string(),
        "description = {anomap cube}".to_string(),
        format!("samples = {}", cols),
        format!("lines   = {}", rows),
        format!("bands   = {}", bands),
        "header offset = 0".to_string(),
        "file type = ENVI Standard".to_string(),
        format!("data type = {}", EnviDataType::F32.code()),
        "interleave = bsq".to_string(),
        "byte order = 0".to_string(),
        format!("data ignore value = {}", cube.nodata()),
    ];
    let gt = cube.transform();
    header.push(format!(
        "map info = {{Arbitrary, 1, 1, {}, {}, {}, {}}}",
        gt.origin_x,
        gt.origin_y,
        gt.pixel_width,
        gt.pixel_height.abs()
    ));
    if let Some(wkt) = cube.crs().and_then(|c| c.wkt()) {
        header.push(format!("coordinate system string = {{{}}}", wkt));
    }
    if let Some(wavelengths) = cube.wavelengths() {
        let list: Vec<String> = wavelengths.iter().map(|w| format!("{:.2}", w)).collect();
        header.push(format!("wavelength = {{{}}}", list.join(", ")));
    }
    std::fs::write(&header_path, header.join("\n") + "\n")?;

    let mut writer = BufWriter::new(File::create(&raw_path)?);
    let data = cube.data();
    for b in 0..bands {
        for r in 0..rows {
            for c in 0..cols {
                writer.write_f32::<LittleEndian>(data[(r, c, b)])?;
            }
        }
    }
    writer.flush()?;

    Ok(header_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const HEADER: &str = "ENVI
description = {EMIT L2A reflectance}
samples = 3
lines   = 2
bands   = 4
header offset = 0
file type = ENVI Standard
data type = 4
interleave = bsq
byte order = 0
data ignore value = -9999
map info = {UTM, 1.000, 1.000, 500000.0, 8000000.0, 60.0, 60.0, 23, South}
wavelength = {450.5, 550.25,
 650.0, 860.0}
";

    #[test]
    fn test_parse_header() {
        let h = parse_envi_header(HEADER).unwrap();
        assert_eq!((h.samples, h.lines, h.bands), (3, 2, 4));
        assert_eq!(h.data_type, EnviDataType::F32);
        assert_eq!(h.interleave, Interleave::Bsq);
        assert!(!h.big_endian);
        assert_eq!(h.nodata, Some(-9999.0));
        assert_eq!(h.description.as_deref(), Some("EMIT L2A reflectance"));
        let w = h.wavelengths.unwrap();
        assert_eq!(w.len(), 4);
        assert_relative_eq!(w[1], 550.25);
        let gt = h.transform.unwrap();
        assert_relative_eq!(gt.origin_x, 500000.0);
        assert_relative_eq!(gt.pixel_height, -60.0);
    }

    #[test]
    fn test_missing_magic() {
        assert!(matches!(
            parse_envi_header("samples = 3\n"),
            Err(Error::Header(_))
        ));
    }

    #[test]
    fn test_missing_required_key() {
        let text = "ENVI\nsamples = 3\nlines = 2\ndata type = 4\n";
        assert!(matches!(parse_envi_header(text), Err(Error::Header(_))));
    }

    #[test]
    fn test_wavelength_count_must_match() {
        let text = "ENVI\nsamples = 1\nlines = 1\nbands = 3\ndata type = 4\nwavelength = {1, 2}\n";
        assert!(matches!(parse_envi_header(text), Err(Error::Header(_))));
    }

    #[test]
    fn test_micrometre_wavelengths() {
        let text = "ENVI\nsamples = 1\nlines = 1\nbands = 2\ndata type = 4\n\
                    wavelength units = Micrometers\nwavelength = {0.55, 0.86}\n";
        let w = parse_envi_header(text).unwrap().wavelengths.unwrap();
        assert_relative_eq!(w[0], 550.0, epsilon = 1e-9);
        assert_relative_eq!(w[1], 860.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unsupported_data_type() {
        let text = "ENVI\nsamples = 1\nlines = 1\nbands = 1\ndata type = 6\n";
        assert!(matches!(
            parse_envi_header(text),
            Err(Error::UnsupportedDataType(_))
        ));
    }

    #[test]
    fn test_read_bip_big_endian_i16() {
        let dir = tempfile::tempdir().unwrap();
        let hdr = dir.path().join("scene.hdr");
        std::fs::write(
            &hdr,
            "ENVI\nsamples = 2\nlines = 1\nbands = 2\ndata type = 2\ninterleave = bip\nbyte order = 1\n",
        )
        .unwrap();
        // pixel0 = [1, 2], pixel1 = [3, 4]
        let mut raw = Vec::new();
        for v in [1i16, 2, 3, 4] {
            raw.write_i16::<BigEndian>(v).unwrap();
        }
        std::fs::write(dir.path().join("scene.raw"), raw).unwrap();

        let cube = read_envi(&hdr).unwrap();
        assert_eq!(cube.shape(), (1, 2, 2));
        assert_eq!(cube.data()[(0, 1, 0)], 3.0);
        assert_eq!(cube.data()[(0, 1, 1)], 4.0);
        assert_eq!(cube.nodata(), DEFAULT_NODATA);
    }

    #[test]
    fn test_read_bil() {
        let dir = tempfile::tempdir().unwrap();
        let hdr = dir.path().join("bil.hdr");
        std::fs::write(
            &hdr,
            "ENVI\nsamples = 2\nlines = 1\nbands = 2\ndata type = 1\ninterleave = bil\n",
        )
        .unwrap();
        // line0: band0 = [1, 2], band1 = [3, 4]
        std::fs::write(dir.path().join("bil.img"), [1u8, 2, 3, 4]).unwrap();

        let cube = read_envi(&hdr).unwrap();
        assert_eq!(cube.data()[(0, 0, 1)], 3.0);
        assert_eq!(cube.data()[(0, 1, 0)], 2.0);
    }

    #[test]
    fn test_missing_companion_file() {
        let dir = tempfile::tempdir().unwrap();
        let hdr = dir.path().join("orphan.hdr");
        std::fs::write(&hdr, "ENVI\nsamples = 1\nlines = 1\nbands = 1\ndata type = 4\n").unwrap();
        assert!(matches!(read_envi(&hdr), Err(Error::MissingFile(_))));
    }

    #[test]
    fn test_truncated_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let hdr = dir.path().join("short.hdr");
        std::fs::write(
            &hdr,
            "ENVI\nsamples = 4\nlines = 4\nbands = 2\ndata type = 4\nheader offset = 16\n",
        )
        .unwrap();
        // 32 samples of 4 bytes after a 16 byte offset need 144 bytes
        std::fs::write(dir.path().join("short.raw"), vec![0u8; 143]).unwrap();
        assert!(matches!(read_envi(&hdr), Err(Error::Header(_))));

        std::fs::write(dir.path().join("short.raw"), vec![0u8; 144]).unwrap();
        assert_eq!(read_envi(&hdr).unwrap().shape(), (4, 4, 2));
    }

    #[test]
    fn test_oversized_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let hdr = dir.path().join("huge.hdr");
        let text = format!(
            "ENVI\nsamples = {}\nlines = {}\nbands = 4\ndata type = 4\n",
            usize::MAX / 2,
            3
        );
        std::fs::write(&hdr, text).unwrap();
        std::fs::write(dir.path().join("huge.raw"), [0u8; 16]).unwrap();
        assert!(matches!(read_envi(&hdr), Err(Error::Header(_))));
    }

    #[test]
    fn test_missing_header() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_envi(dir.path().join("nope.hdr")),
            Err(Error::MissingFile(_))
        ));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let data = Array3::from_shape_fn((2, 3, 4), |(r, c, b)| (r * 12 + c * 4 + b) as f32);
        let cube = SpectralCube::new(data)
            .with_wavelengths(vec![450.0, 550.0, 650.0, 860.0])
            .unwrap()
            .with_transform(GeoTransform::new(100.0, 200.0, 30.0, -30.0));

        let hdr = write_envi(dir.path().join("cube"), &cube).unwrap();
        let back = read_envi(&hdr).unwrap();

        assert_eq!(back.shape(), (2, 3, 4));
        assert_eq!(back.data(), cube.data());
        assert_eq!(back.wavelengths().unwrap()[3], 860.0);
        assert_relative_eq!(back.transform().origin_y, 200.0);
        assert_relative_eq!(back.transform().pixel_width, 30.0);
    }
}
