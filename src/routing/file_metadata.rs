//! Structured attributes encoded in DWD file names.

use chrono::NaiveDate;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub model: String,
    pub scope: Option<String>,
    pub grid: Option<String>,
    pub level_type: Option<String>,
    /// Model run as `YYYYMMDDHH`.
    pub run: Option<String>,
    pub step: Option<String>,
    pub level: Option<String>,
    /// Quantity for grid files, station id for point files.
    pub field: String,
    pub extension: String,
}

/// Splits `name` at its first dot into stem and extension.
fn split_extension(name: &str) -> Result<(&str, &str)> {
    match name.split_once('.') {
        Some((stem, extension)) if !stem.is_empty() && !extension.is_empty() => {
            Ok((stem, extension))
        }
        _ => Err(Error::routing(name, "missing file extension")),
    }
}

fn check_run(name: &str, run: &str) -> Result<()> {
    let valid = run.len() == 10
        && run.bytes().all(|b| b.is_ascii_digit())
        && NaiveDate::parse_from_str(&run[..8], "%Y%m%d").is_ok()
        && run[8..].parse::<u32>().map(|h| h < 24).unwrap_or(false);

    if valid {
        Ok(())
    } else {
        Err(Error::routing(name, format!("malformed run `{run}`")))
    }
}

fn check_step(name: &str, step: &str) -> Result<()> {
    if !step.is_empty() && step.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(Error::routing(name, format!("malformed forecast step `{step}`")))
    }
}

impl FileMetadata {
    /// Parses a GRIB file name. ICON names lead with the model and carry the field
    /// last; legacy COSMO names carry run and step last.
    pub fn from_grib_name(name: &str) -> Result<Self> {
        let (stem, extension) = split_extension(name)?;
        let tokens: Vec<&str> = stem.split('_').collect();

        match tokens.first() {
            Some(model) if model.eq_ignore_ascii_case("cosmode") => {
                Self::from_cosmo_tokens(name, &tokens, extension)
            }
            _ => Self::from_icon_tokens(name, &tokens, extension),
        }
    }

    // icon-d2_germany_regular-lat-lon_single-level_2021022100_008_2d_aswdifd_s
    fn from_icon_tokens(name: &str, tokens: &[&str], extension: &str) -> Result<Self> {
        if tokens.len() < 8 {
            return Err(Error::routing(name, "too few name tokens for ICON layout"));
        }

        check_run(name, tokens[4])?;
        check_step(name, tokens[5])?;

        Ok(FileMetadata {
            model: tokens[0].to_string(),
            scope: Some(tokens[1].to_string()),
            grid: Some(tokens[2].to_string()),
            level_type: Some(tokens[3].to_string()),
            run: Some(tokens[4].to_string()),
            step: Some(tokens[5].to_string()),
            level: Some(tokens[6].to_string()),
            field: tokens[7..].join("_"),
            extension: extension.to_string(),
        })
    }

    // COSMODE_single_level_elements_ASWDIFD_S_2018011803_000
    fn from_cosmo_tokens(name: &str, tokens: &[&str], extension: &str) -> Result<Self> {
        let n = tokens.len();
        if n < 7 {
            return Err(Error::routing(name, "too few name tokens for COSMO layout"));
        }

        let run = tokens[n - 2];
        let step = tokens[n - 1];
        check_run(name, run)?;
        check_step(name, step)?;

        Ok(FileMetadata {
            model: tokens[0].to_lowercase(),
            scope: None,
            grid: None,
            level_type: Some(tokens[1..3].join("_")),
            run: Some(run.to_string()),
            step: Some(step.to_string()),
            level: None,
            field: tokens[4..n - 2].join("_"),
            extension: extension.to_string(),
        })
    }

    /// Parses a point-data file name such as `10708-MOSMIX.csv`.
    pub fn from_poi_name(name: &str) -> Result<Self> {
        let (stem, extension) = split_extension(name)?;
        if !extension.eq_ignore_ascii_case("csv") {
            return Err(Error::routing(name, format!("unexpected extension `{extension}`")));
        }

        let (station, product) = stem
            .split_once('-')
            .ok_or_else(|| Error::routing(name, "expected `<station>-<product>`"))?;

        if station.is_empty() || !station.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::routing(name, format!("malformed station id `{station}`")));
        }
        if product.is_empty() {
            return Err(Error::routing(name, "missing product name"));
        }

        Ok(FileMetadata {
            model: product.to_lowercase(),
            scope: None,
            grid: None,
            level_type: None,
            run: None,
            step: None,
            level: None,
            field: station.to_string(),
            extension: extension.to_string(),
        })
    }
}
