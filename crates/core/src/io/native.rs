//! GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Georeferencing is carried by the pixel scale and
//! tie point tags, the nodata sentinel by the GDAL nodata tag and the CRS by
//! the EPSG code stored in the GeoKey directory.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Read the first band of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file))
}

fn tiff_err(what: &str) -> impl FnOnce(tiff::TiffError) -> Error + '_ {
    move |e| Error::Other(format!("{what}: {e}"))
}

fn cast_all<T: RasterElement, S: Copy + num_traits::NumCast>(
    buf: Vec<S>,
    lossy: &mut bool,
) -> Vec<T> {
    buf.into_iter()
        .map(|v| match num_traits::cast(v) {
            Some(v) => v,
            None => {
                *lossy = true;
                T::default_nodata()
            }
        })
        .collect()
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder = Decoder::new(reader).map_err(tiff_err("TIFF decode error"))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(tiff_err("Cannot read dimensions"))?;
    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(tiff_err("Cannot read image data"))?;

    // Values that do not fit T (NaN into an integer raster) become T's default nodata
    let mut lossy = false;
    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(buf, &mut lossy),
        DecodingResult::F64(buf) => cast_all(buf, &mut lossy),
        DecodingResult::U8(buf) => cast_all(buf, &mut lossy),
        DecodingResult::U16(buf) => cast_all(buf, &mut lossy),
        DecodingResult::U32(buf) => cast_all(buf, &mut lossy),
        DecodingResult::I8(buf) => cast_all(buf, &mut lossy),
        DecodingResult::I16(buf) => cast_all(buf, &mut lossy),
        DecodingResult::I32(buf) => cast_all(buf, &mut lossy),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ));
        }
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }

    let nodata = decoder
        .get_tag_ascii_string(Tag::Unknown(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok())
        .and_then(T::from_f64);
    match nodata {
        Some(nd) => raster.set_nodata(Some(nd)),
        None if lossy && !T::is_float() => raster.set_nodata(Some(T::default_nodata())),
        None => {}
    }

    if let Some(crs) = read_crs(&mut decoder) {
        raster.set_crs(Some(crs));
    }

    Ok(raster)
}

/// GeoTransform from ModelPixelScaleTag + ModelTiepointTag
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE))
        .ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT)).ok()?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }
    None
}

/// EPSG code from the GeoKey directory, if any
fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder
        .get_tag_u16_vec(Tag::Unknown(GEO_KEY_DIRECTORY))
        .ok()?;
    // header [version, revision, minor, count] then 4-tuples [id, location, count, value]
    keys.get(4..)?
        .chunks_exact(4)
        .filter(|k| k[1] == 0)
        .find(|k| k[0] == PROJECTED_CS_TYPE_KEY || k[0] == GEOGRAPHIC_TYPE_KEY)
        .map(|k| CRS::from_epsg(u32::from(k[3])))
}

/// Write a Raster to a GeoTIFF file as 32-bit float
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, BufWriter::new(file))
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;

    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(tiff_err("Cannot create TIFF image"))?;

    let gt = raster.transform();

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tiff_err("Cannot write scale tag"))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tiff_err("Cannot write tiepoint tag"))?;

    let geographic = raster.crs().is_some_and(CRS::is_geographic);
    let model_type = if geographic { 2 } else { 1 };
    let mut geokeys: Vec<u16> = vec![
        1, 1, 0, 2,
        GT_MODEL_TYPE_KEY, 0, 1, model_type,
        GT_RASTER_TYPE_KEY, 0, 1, 1, // RasterPixelIsArea
    ];
    if let Some(code) = raster.crs().and_then(CRS::epsg).and_then(|c| u16::try_from(c).ok()) {
        let key = if geographic {
            GEOGRAPHIC_TYPE_KEY
        } else {
            PROJECTED_CS_TYPE_KEY
        };
        geokeys.extend_from_slice(&[key, 0, 1, code]);
        geokeys[3] = 3;
    }
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(tiff_err("Cannot write geokey tag"))?;

    if let Some(nd) = raster.nodata().and_then(|v| v.to_f64()) {
        let text = if nd.is_nan() { "nan".to_string() } else { nd.to_string() };
        image
            .encoder()
            .write_tag(Tag::Unknown(GDAL_NODATA), text.as_str())
            .map_err(tiff_err("Cannot write nodata tag"))?;
    }

    image
        .write_data(&data)
        .map_err(tiff_err("Cannot write image data"))?;

    Ok(())
}
