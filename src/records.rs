//! Domain records: discoveries and the observations attached to them.
//!
//! Wire format follows the remote authority's JSON: a discovery is addressed
//! by its entity key (the map key, never a field), photo payloads travel as
//! base64 text under the `photo` key, and absent optional fields may arrive
//! as empty strings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Full entity mapping as exchanged with the remote authority.
pub type DiscoveryMap = HashMap<String, Discovery>;

/// Accumulated knowledge about one subject.
///
/// Mutation is always whole-record replace-by-key; observations are never
/// patched in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  /// Set by the server when the subject was first recorded
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub discovered_at: Option<String>,

  #[serde(default)]
  pub photos: Vec<Observation>,
}

/// One dated, optionally geolocated data point attached to a discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
  /// Server-assigned id; absent until the photo has been accepted remotely
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<i64>,

  #[serde(default)]
  pub date: String,

  #[serde(default)]
  pub location: String,

  #[serde(default, deserialize_with = "de_coordinates", skip_serializing_if = "Option::is_none")]
  pub coordinates: Option<Coordinates>,

  #[serde(default)]
  pub country: String,

  #[serde(default)]
  pub region: String,

  #[serde(default)]
  pub city: String,

  /// Base64 photo payload, opaque to this layer
  #[serde(rename = "photo", default)]
  pub photo_data: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub thumbnail: Option<String>,

  #[serde(default)]
  pub sex: Sex,

  #[serde(default)]
  pub note: String,
}

/// Latitude/longitude pair attached to an observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
  pub lat: f64,
  pub lng: f64,
}

/// Reported sex of the observed subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
  Male,
  Female,
  #[default]
  #[serde(other)]
  Unknown,
}

/// The server emits `""` (or a raw JSON string) for missing coordinates;
/// treat anything that is not a lat/lng object as absent.
fn de_coordinates<'de, D>(deserializer: D) -> Result<Option<Coordinates>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Pair(Coordinates),
    Other(serde::de::IgnoredAny),
  }

  Ok(match Option::<Raw>::deserialize(deserializer)? {
    Some(Raw::Pair(pair)) => Some(pair),
    _ => None,
  })
}
