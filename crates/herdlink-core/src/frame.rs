// ── Telemetry frame parser ──
//
// Wire format: UTF-8 text `id,latitude,longitude`, surrounding whitespace
// ignored. Anything else is a dropped frame.

use crate::error::FrameError;
use crate::model::TrackerId;

/// One decoded position report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFrame {
    pub id: TrackerId,
    pub latitude: f64,
    pub longitude: f64,
}

/// Decode a raw notification payload.
pub fn parse_frame(payload: &[u8]) -> Result<TelemetryFrame, FrameError> {
    let text = std::str::from_utf8(payload).map_err(|_| FrameError::NotUtf8)?;
    let fields: Vec<&str> = text.trim().split(',').map(str::trim).collect();

    let [id, latitude, longitude] = fields.as_slice() else {
        return Err(FrameError::FieldCount {
            found: fields.len(),
        });
    };

    let id = id
        .parse::<i32>()
        .map_err(|_| FrameError::InvalidId((*id).to_owned()))?;

    Ok(TelemetryFrame {
        id: TrackerId::new(id),
        latitude: parse_coordinate(latitude)?,
        longitude: parse_coordinate(longitude)?,
    })
}

fn parse_coordinate(raw: &str) -> Result<f64, FrameError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FrameError::InvalidCoordinate(raw.to_owned()))
}
