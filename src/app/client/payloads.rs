//! Wire payloads of the remote lineup API
//!
//! The remote is loose about scalar types: channel numbers and image sizes
//! arrive as strings or numbers, and `primary` as `"true"` or a boolean.
//! Payloads tolerate both and convert into the normalized models; entries
//! without an identifier are dropped.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::app::models::{
    BaseStation, Lineup, Logo, StationDetail, StationLineup, StationListing,
};

/// Entry of `GET /tms/lineups/{country}/{postal}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineupPayload {
    #[serde(default, deserialize_with = "string_or_number")]
    pub lineup_id: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "type")]
    pub lineup_type: Option<String>,
    pub device: Option<String>,
    pub mso: Option<MsoPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MsoPayload {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Entry of `GET /dvr/guide/stations/{lineupId}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationPayload {
    #[serde(default, deserialize_with = "string_or_number")]
    pub station_id: Option<String>,
    pub call_sign: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub channel: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub affiliate_id: Option<String>,
    pub affiliate_call_sign: Option<String>,
    pub preferred_image: Option<ImagePayload>,
    pub video_quality: Option<VideoQualityPayload>,
}

/// Entry of `GET /tms/stations/{callSign}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationDetailPayload {
    #[serde(default, deserialize_with = "string_or_number")]
    pub station_id: Option<String>,
    pub call_sign: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub station_type: Option<String>,
    pub bcast_langs: Option<Vec<String>>,
    pub preferred_image: Option<ImagePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagePayload {
    pub uri: Option<String>,
    #[serde(default, deserialize_with = "integer_or_string")]
    pub width: Option<i64>,
    #[serde(default, deserialize_with = "integer_or_string")]
    pub height: Option<i64>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "bool_or_string")]
    pub primary: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoQualityPayload {
    pub signal_type: Option<String>,
    pub video_type: Option<String>,
    pub tru_resolution: Option<String>,
}

impl LineupPayload {
    pub fn into_lineup(self) -> Option<Lineup> {
        let lineup_id = self.lineup_id.filter(|id| !id.is_empty())?;
        let (mso_id, mso_name) = match self.mso {
            Some(mso) => (mso.id, mso.name),
            None => (None, None),
        };

        Some(Lineup {
            lineup_id,
            name: self.name.unwrap_or_default(),
            location: self.location,
            lineup_type: self.lineup_type,
            device: self.device,
            mso_id,
            mso_name,
        })
    }
}

impl StationPayload {
    pub fn into_listing(self, lineup_id: &str) -> Option<StationListing> {
        let station_id = self.station_id.filter(|id| !id.is_empty())?;
        let video = self.video_quality.unwrap_or_default();

        Some(StationListing {
            station: BaseStation {
                station_id: station_id.clone(),
                call_sign: self.call_sign,
                logo: self.preferred_image.map(Logo::from).unwrap_or_default(),
            },
            lineup: StationLineup {
                station_id,
                lineup_id: lineup_id.to_string(),
                channel_number: self.channel,
                affiliate_id: self.affiliate_id,
                affiliate_call_sign: self.affiliate_call_sign,
                signal_type: video.signal_type,
                video_type: video.video_type,
                tru_resolution: video.tru_resolution,
            },
        })
    }
}

impl StationDetailPayload {
    pub fn into_detail(self) -> Option<StationDetail> {
        let station_id = self.station_id.filter(|id| !id.is_empty())?;
        Some(StationDetail {
            station_id,
            call_sign: self.call_sign,
            name: self.name,
            station_type: self.station_type,
            bcast_langs: self.bcast_langs.unwrap_or_default(),
            logo: self.preferred_image.map(Logo::from).unwrap_or_default(),
        })
    }
}

impl From<ImagePayload> for Logo {
    fn from(image: ImagePayload) -> Self {
        Logo {
            uri: image.uri,
            width: image.width,
            height: image.height,
            category: image.category,
            primary: image.primary,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, found {}",
            other
        ))),
    }
}

// Unparseable sizes are treated as absent.
fn integer_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn bool_or_string<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => Some(s.eq_ignore_ascii_case("true")),
        _ => None,
    })
}
