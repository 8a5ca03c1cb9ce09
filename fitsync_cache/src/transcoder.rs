//! The file-format transcoder is, per spec §1, an external collaborator:
//! the core treats its output as authoritative for the destination and
//! does not specify lossy-field semantics (spec §9 open question). This
//! module defines the trait the cache consumes and ships one best-effort
//! implementation built on `fitparser` and `gpx` — real FIT decoding and
//! GPX encoding, not a byte-for-byte format spec.

use fitparser::{profile::MesgNum, FitDataRecord, Value};
use fitsync_adapters::FileFormat;
use fitsync_core::error::SyncError;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use geo_types::Point;

pub trait Transcoder: Send + Sync {
    fn convert(&self, bytes: &[u8], from: FileFormat, to: FileFormat) -> Result<Vec<u8>, SyncError>;

    /// Whether this transcoder can service a given conversion at all,
    /// independent of whether any particular input parses cleanly.
    fn supports(&self, from: FileFormat, to: FileFormat) -> bool;
}

/// FIT -> GPX using `fitparser` to read `record` messages and `gpx` to
/// write a single-segment track. Every other direction is unsupported:
/// TCX/GPX re-encoding and FIT synthesis are genuinely lossy/ambiguous
/// enough that spec §9 leaves them unspecified, so we decline rather than
/// guess.
#[derive(Default)]
pub struct BestEffortTranscoder;

impl Transcoder for BestEffortTranscoder {
    fn supports(&self, from: FileFormat, to: FileFormat) -> bool {
        from == to || (from == FileFormat::Fit && to == FileFormat::Gpx)
    }

    fn convert(&self, bytes: &[u8], from: FileFormat, to: FileFormat) -> Result<Vec<u8>, SyncError> {
        if from == to {
            return Ok(bytes.to_vec());
        }
        match (from, to) {
            (FileFormat::Fit, FileFormat::Gpx) => fit_to_gpx(bytes),
            _ => Err(SyncError::UnsupportedConversion {
                from: from.extension().to_string(),
                to: to.extension().to_string(),
            }),
        }
    }
}

fn fit_to_gpx(bytes: &[u8]) -> Result<Vec<u8>, SyncError> {
    let records = fitparser::from_bytes(bytes).map_err(|e| SyncError::Validation(e.to_string()))?;

    let mut segment = TrackSegment::new();
    for record in records.iter().filter(|r| r.kind() == MesgNum::Record) {
        if let Some(point) = waypoint_from_record(record) {
            segment.points.push(point);
        }
    }

    if segment.points.is_empty() {
        return Err(SyncError::Validation(
            "FIT file carried no GPS record messages to transcode".to_string(),
        ));
    }

    let mut track = Track::new();
    track.segments.push(segment);

    let gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some("fitsync".to_string()),
        tracks: vec![track],
        ..Gpx::default()
    };

    let mut out = Vec::new();
    gpx::write(&gpx, &mut out).map_err(|e| SyncError::Validation(e.to_string()))?;
    Ok(out)
}

fn waypoint_from_record(record: &FitDataRecord) -> Option<Waypoint> {
    let lat = semicircles_to_degrees(find_value(record, "position_lat")?);
    let lon = semicircles_to_degrees(find_value(record, "position_long")?);
    let mut waypoint = Waypoint::new(Point::new(lon, lat));
    if let Some(Value::Float64(alt)) = find_raw(record, "altitude") {
        waypoint.elevation = Some(*alt);
    }
    Some(waypoint)
}

fn find_raw<'a>(record: &'a FitDataRecord, field: &str) -> Option<&'a Value> {
    record.fields().iter().find(|f| f.name() == field).map(|f| f.value())
}

fn find_value(record: &FitDataRecord, field: &str) -> Option<f64> {
    match find_raw(record, field)? {
        Value::SInt32(v) => Some(*v as f64),
        Value::Float64(v) => Some(*v),
        _ => None,
    }
}

fn semicircles_to_degrees(semicircles: f64) -> f64 {
    semicircles * (180.0 / 2_147_483_648.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_format_is_a_passthrough() {
        let t = BestEffortTranscoder;
        let input = b"not really a fit file".to_vec();
        let out = t.convert(&input, FileFormat::Fit, FileFormat::Fit).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn unsupported_direction_is_rejected() {
        let t = BestEffortTranscoder;
        assert!(!t.supports(FileFormat::Gpx, FileFormat::Fit));
        let err = t.convert(b"<gpx/>", FileFormat::Gpx, FileFormat::Fit).unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedConversion { .. }));
    }
}
