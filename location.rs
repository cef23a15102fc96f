use crate::error::{Error, Result};
use crate::models::Location;
use serde::{Deserialize, Serialize};

pub const KENYA_COUNTIES: [&str; 47] = [
    "Mombasa", "Kwale", "Kilifi", "Tana River", "Lamu", "Taita-Taveta", "Garissa",
    "Wajir", "Mandera", "Marsabit", "Isiolo", "Meru", "Tharaka-Nithi", "Embu",
    "Kitui", "Machakos", "Makueni", "Nyandarua", "Nyeri", "Kirinyaga", "Murang'a",
    "Kiambu", "Turkana", "West Pokot", "Samburu", "Trans-Nzoia", "Uasin Gishu",
    "Elgeyo-Marakwet", "Nandi", "Baringo", "Laikipia", "Nakuru", "Narok", "Kajiado",
    "Kericho", "Bomet", "Kakamega", "Vihiga", "Bungoma", "Busia", "Siaya", "Kisumu",
    "Homa Bay", "Migori", "Kisii", "Nyamira", "Nairobi",
];

pub const NAIROBI_LATITUDE: f64 = -1.2921;
pub const NAIROBI_LONGITUDE: f64 = 36.8219;

pub fn is_known_county(county: &str) -> bool {
    KENYA_COUNTIES.contains(&county)
}

/// Where the reporter says the incident happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum LocationInput {
    Manual {
        county: String,
        #[serde(default)]
        sub_county: String,
        #[serde(default)]
        ward: String,
        #[serde(default)]
        location: String,
        latitude: f64,
        longitude: f64,
    },
    SimulatedGps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

/// There is no positioning hardware behind this; it always reports Nairobi.
pub fn current_location() -> GpsFix {
    GpsFix {
        latitude: NAIROBI_LATITUDE,
        longitude: NAIROBI_LONGITUDE,
        address: "Nairobi, Kenya".to_string(),
    }
}

pub fn simulated_location() -> Location {
    let fix = current_location();
    Location {
        county: "Nairobi".to_string(),
        sub_county: "Westlands".to_string(),
        ward: "Parklands".to_string(),
        location: "Nairobi CBD".to_string(),
        latitude: fix.latitude,
        longitude: fix.longitude,
    }
}

pub fn resolve(input: LocationInput) -> Result<Location> {
    match input {
        LocationInput::SimulatedGps => Ok(simulated_location()),
        LocationInput::Manual {
            county,
            sub_county,
            ward,
            location,
            latitude,
            longitude,
        } => {
            if !is_known_county(&county) {
                return Err(Error::Validation(format!("Unknown county: {county}")));
            }
            if !latitude.is_finite() || !longitude.is_finite() {
                return Err(Error::Validation(
                    "Latitude and longitude must be numbers".into(),
                ));
            }
            Ok(Location {
                county,
                sub_county: sub_county.trim().to_string(),
                ward: ward.trim().to_string(),
                location: location.trim().to_string(),
                latitude,
                longitude,
            })
        }
    }
}
