use crate::influx::Sample;
use chrono::{DateTime, Utc};

/// One cycle's assembled weather observation. `None` is the unset sentinel
/// for every numeric field; a report is only transmittable once `time` is
/// set.
#[derive(Debug, Clone, PartialEq)]
pub struct WxReport {
    pub lat: f64,
    pub lon: f64,
    pub comment: String,
    pub time: Option<DateTime<Utc>>,
    pub temperature_f: Option<i32>,
    pub humidity_pct: Option<i32>,
    pub solar_rad_wm2: Option<i32>,
    pub wind_dir_deg: Option<i32>,
    pub wind_gust_mph: Option<i32>,
    pub wind_speed_mph: Option<i32>,
}

impl WxReport {
    pub fn new(lat: f64, lon: f64, comment: &str) -> Self {
        Self {
            lat,
            lon,
            comment: comment.to_string(),
            time: None,
            temperature_f: None,
            humidity_pct: None,
            solar_rad_wm2: None,
            wind_dir_deg: None,
            wind_gust_mph: None,
            wind_speed_mph: None,
        }
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// A new observation, ready to transmit.
    Report(WxReport),
    /// First sample repeats the previously transmitted timestamp.
    Duplicate(DateTime<Utc>),
    /// No usable samples this cycle.
    Empty,
}

type Convert = fn(f64) -> i32;
type Slot = fn(&mut WxReport) -> &mut Option<i32>;

const FIELD_CONVERSIONS: &[(&str, Convert, Slot)] = &[
    ("temperature_C", celsius_to_fahrenheit, |wx| {
        &mut wx.temperature_f
    }),
    ("humidity", round_whole, |wx| &mut wx.humidity_pct),
    ("light_lux", lux_to_irradiance, |wx| &mut wx.solar_rad_wm2),
    ("wind_dir_deg", round_whole, |wx| &mut wx.wind_dir_deg),
    ("wind_max_m_s", mps_to_mph, |wx| &mut wx.wind_gust_mph),
    ("wind_avg_m_s", mps_to_mph, |wx| &mut wx.wind_speed_mph),
];

fn celsius_to_fahrenheit(c: f64) -> i32 {
    (c * 1.8 + 32.0).round() as i32
}

fn round_whole(v: f64) -> i32 {
    v.round() as i32
}

// lux / 126 = W/m^2. Integer division after rounding the lux value; the
// quotient truncates.
fn lux_to_irradiance(lux: f64) -> i32 {
    lux.round() as i32 / 126
}

fn mps_to_mph(mps: f64) -> i32 {
    (mps * 2.23694).round() as i32
}

fn apply_sample(report: &mut WxReport, field: &str, value: f64) {
    if let Some((_, convert, slot)) = FIELD_CONVERSIONS
        .iter()
        .find(|(name, _, _)| *name == field)
    {
        *slot(report) = Some(convert(value));
    }
}

/// Builds one observation from a cycle's sample stream.
///
/// The first sample decides the report timestamp: if it is missing, or
/// repeats `last_seen`, the whole cycle is abandoned right there and the
/// remaining samples are never consumed. The caller commits the returned
/// timestamp as the new `last_seen` before attempting transmission.
pub fn assemble<I>(
    samples: I,
    last_seen: Option<DateTime<Utc>>,
    lat: f64,
    lon: f64,
    comment: &str,
) -> CycleOutcome
where
    I: IntoIterator<Item = Sample>,
{
    let mut report = WxReport::new(lat, lon, comment);
    for sample in samples {
        if report.time.is_none() {
            let Some(time) = sample.time else {
                return CycleOutcome::Empty;
            };
            if last_seen == Some(time) {
                return CycleOutcome::Duplicate(time);
            }
            report.time = Some(time);
        }
        apply_sample(&mut report, &sample.field, sample.value);
    }
    if report.time.is_some() {
        CycleOutcome::Report(report)
    } else {
        CycleOutcome::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::Cell;

    fn t1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 1, 11, 58, 12).unwrap()
    }

    fn sample(field: &str, value: f64, time: Option<DateTime<Utc>>) -> Sample {
        Sample {
            field: field.to_string(),
            value,
            time,
        }
    }

    #[test]
    fn temperature_converts_to_fahrenheit() {
        assert_eq!(celsius_to_fahrenheit(0.0), 32);
        assert_eq!(celsius_to_fahrenheit(100.0), 212);
        assert_eq!(celsius_to_fahrenheit(20.0), 68);
        assert_eq!(celsius_to_fahrenheit(-40.0), -40);
    }

    #[test]
    fn wind_speed_converts_to_mph() {
        assert_eq!(mps_to_mph(10.0), 22);
        assert_eq!(mps_to_mph(0.0), 0);
        assert_eq!(mps_to_mph(5.0), 11);
    }

    #[test]
    fn lux_conversion_truncates_after_rounding() {
        assert_eq!(lux_to_irradiance(252.0), 2);
        assert_eq!(lux_to_irradiance(0.0), 0);
        // 251.6 rounds to 252 before the division.
        assert_eq!(lux_to_irradiance(251.6), 2);
        // 377/126 truncates to 2, not 3.
        assert_eq!(lux_to_irradiance(377.0), 2);
    }

    #[test]
    fn assembles_report_from_new_samples() {
        let samples = vec![
            sample("temperature_C", 20.0, Some(t1())),
            sample("humidity", 55.3, Some(t1())),
            sample("wind_avg_m_s", 5.0, Some(t1())),
        ];
        let outcome = assemble(samples, None, 40.125, -105.5, "test station");
        let CycleOutcome::Report(report) = outcome else {
            panic!("expected a report");
        };
        assert_eq!(report.time, Some(t1()));
        assert_eq!(report.temperature_f, Some(68));
        assert_eq!(report.humidity_pct, Some(55));
        assert_eq!(report.wind_speed_mph, Some(11));
        assert_eq!(report.solar_rad_wm2, None);
        assert_eq!(report.wind_dir_deg, None);
        assert_eq!(report.wind_gust_mph, None);
        assert_eq!(report.lat, 40.125);
        assert_eq!(report.comment, "test station");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let samples = vec![
            sample("temperature_C", 20.0, Some(t1())),
            sample("battery_ok", 1.0, Some(t1())),
        ];
        let CycleOutcome::Report(report) = assemble(samples, None, 0.0, 0.0, "") else {
            panic!("expected a report");
        };
        assert_eq!(report.temperature_f, Some(68));
        assert_eq!(report.humidity_pct, None);
    }

    #[test]
    fn duplicate_timestamp_abandons_cycle_without_consuming_rest() {
        let consumed = Cell::new(0usize);
        let samples = [
            sample("temperature_C", 20.0, Some(t1())),
            sample("humidity", 55.3, Some(t1())),
            sample("wind_avg_m_s", 5.0, Some(t1())),
        ];
        let counted = samples.iter().cloned().inspect(|_| {
            consumed.set(consumed.get() + 1);
        });
        let outcome = assemble(counted, Some(t1()), 0.0, 0.0, "");
        assert!(matches!(outcome, CycleOutcome::Duplicate(time) if time == t1()));
        assert_eq!(consumed.get(), 1);
    }

    #[test]
    fn empty_stream_is_suppressed() {
        let outcome = assemble(Vec::new(), None, 0.0, 0.0, "");
        assert!(matches!(outcome, CycleOutcome::Empty));
    }

    #[test]
    fn first_sample_without_timestamp_abandons_cycle() {
        let samples = vec![
            sample("temperature_C", 20.0, None),
            sample("humidity", 55.3, Some(t1())),
        ];
        let outcome = assemble(samples, None, 0.0, 0.0, "");
        assert!(matches!(outcome, CycleOutcome::Empty));
    }

    #[test]
    fn later_samples_keep_first_timestamp() {
        let t2 = Utc.with_ymd_and_hms(2023, 6, 1, 11, 59, 40).unwrap();
        let samples = vec![
            sample("temperature_C", 20.0, Some(t1())),
            sample("humidity", 55.3, Some(t2)),
        ];
        let CycleOutcome::Report(report) = assemble(samples, None, 0.0, 0.0, "") else {
            panic!("expected a report");
        };
        assert_eq!(report.time, Some(t1()));
        assert_eq!(report.humidity_pct, Some(55));
    }

    #[test]
    fn new_timestamp_distinct_from_last_seen_produces_report() {
        let t2 = Utc.with_ymd_and_hms(2023, 6, 1, 12, 8, 12).unwrap();
        let samples = vec![sample("temperature_C", 20.0, Some(t2))];
        let outcome = assemble(samples, Some(t1()), 0.0, 0.0, "");
        assert!(matches!(outcome, CycleOutcome::Report(_)));
    }
}
