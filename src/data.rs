//! CSV artifacts
//!
//! Candle history (`Time,Open,High,Low,Close,Volume,Symbol`), the labeled
//! variant with an `SR_Proximity` column, and the level export
//! (`Type,Tier,Price,Timestamp,Touches`). Timestamps are written RFC 3339;
//! loading also accepts the `YYYY-MM-DD HH:MM:SS` form older exports used,
//! read as UTC.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::strategy::{Candle, LevelKind, ProximityLabel, SrLevel};

const CANDLE_HEADER: [&str; 7] = ["Time", "Open", "High", "Low", "Close", "Volume", "Symbol"];

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    // Millisecond epoch, as exchange dumps sometimes carry
    if let Ok(ms) = value.parse::<i64>() {
        if let Some(ts) = DateTime::from_timestamp_millis(ms) {
            return Ok(ts);
        }
    }
    Err(anyhow!("unparseable timestamp: {value}"))
}

fn parse_field<T: std::str::FromStr>(record: &csv::StringRecord, idx: usize) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = record
        .get(idx)
        .ok_or_else(|| anyhow!("missing column {idx}"))?;
    raw.parse()
        .map_err(|e| anyhow!("bad value {raw:?} in column {idx}: {e}"))
}

/// Load candle history, oldest first
pub fn load_candles_csv(path: &Path) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut candles = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("bad CSV record at line {}", line + 2))?;
        let timestamp = parse_timestamp(
            record
                .get(0)
                .ok_or_else(|| anyhow!("missing Time column at line {}", line + 2))?,
        )?;
        candles.push(Candle {
            timestamp,
            open: parse_field(&record, 1)?,
            high: parse_field(&record, 2)?,
            low: parse_field(&record, 3)?,
            close: parse_field(&record, 4)?,
            volume: parse_field(&record, 5)?,
            symbol: record.get(6).unwrap_or_default().to_string(),
        });
    }
    Ok(candles)
}

/// Write candle history in the standard column order
pub fn write_candles_csv(path: &Path, candles: &[Candle]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(CANDLE_HEADER)?;
    for candle in candles {
        writer.write_record(candle_fields(candle))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write candles with their proximity labels appended
pub fn write_labeled_csv(path: &Path, rows: &[(Candle, ProximityLabel)]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut header: Vec<&str> = CANDLE_HEADER.to_vec();
    header.push("SR_Proximity");
    writer.write_record(header)?;
    for (candle, label) in rows {
        let mut fields = candle_fields(candle);
        fields.push(label.to_string());
        writer.write_record(fields)?;
    }
    writer.flush()?;
    Ok(())
}

fn candle_fields(candle: &Candle) -> Vec<String> {
    vec![
        candle.timestamp.to_rfc3339(),
        candle.open.to_string(),
        candle.high.to_string(),
        candle.low.to_string(),
        candle.close.to_string(),
        candle.volume.to_string(),
        candle.symbol.clone(),
    ]
}

/// Export the retained levels in tier order
pub fn write_levels_csv(path: &Path, levels: &[SrLevel]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["Type", "Tier", "Price", "Timestamp", "Touches"])?;
    for level in levels {
        writer.write_record([
            level.kind.to_string(),
            level.tier_label(),
            level.price.to_string(),
            level.last_touched_at.to_rfc3339(),
            level.touch_count.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Reload an exported level CSV
pub fn read_levels_csv(path: &Path) -> Result<Vec<SrLevel>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut levels = Vec::new();
    for record in reader.records() {
        let record = record?;
        let kind = match record.get(0) {
            Some("Support") => LevelKind::Support,
            Some("Resistance") => LevelKind::Resistance,
            other => return Err(anyhow!("unknown level type {other:?}")),
        };
        let tier_field = record.get(1).unwrap_or_default();
        let tier: u8 = tier_field
            .get(1..)
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| anyhow!("malformed tier {tier_field:?}"))?;
        let timestamp = parse_timestamp(record.get(3).unwrap_or_default())?;
        levels.push(SrLevel {
            price: parse_field(&record, 2)?,
            kind,
            tier,
            formed_at: timestamp,
            last_touched_at: timestamp,
            touch_count: parse_field(&record, 4)?,
        });
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_file(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("lhl-trader-data-tests");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn sample_candle(i: i64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
                + chrono::Duration::minutes(i * 5),
            open: 100.0 + i as f64,
            high: 101.0 + i as f64,
            low: 99.0 + i as f64,
            close: 100.5 + i as f64,
            volume: 42.0,
            symbol: "BTC/USDT".to_string(),
        }
    }

    #[test]
    fn candles_round_trip() {
        let path = temp_file("candles.csv");
        let candles: Vec<Candle> = (0..3).map(sample_candle).collect();
        write_candles_csv(&path, &candles).unwrap();

        let loaded = load_candles_csv(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        for (a, b) in candles.iter().zip(loaded.iter()) {
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.close, b.close);
            assert_eq!(a.symbol, b.symbol);
        }
    }

    #[test]
    fn legacy_timestamp_format_is_accepted() {
        assert_eq!(
            parse_timestamp("2024-03-01 12:00:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp("1709294400000").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn levels_round_trip_preserves_tier_ordering() {
        let path = temp_file("levels.csv");
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let levels: Vec<SrLevel> = vec![
            (LevelKind::Support, 1, 95.0, 3),
            (LevelKind::Support, 2, 90.0, 1),
            (LevelKind::Resistance, 1, 105.0, 2),
        ]
        .into_iter()
        .map(|(kind, tier, price, touches)| SrLevel {
            price,
            kind,
            tier,
            formed_at: ts,
            last_touched_at: ts,
            touch_count: touches,
        })
        .collect();

        write_levels_csv(&path, &levels).unwrap();
        let loaded = read_levels_csv(&path).unwrap();

        assert_eq!(loaded.len(), levels.len());
        for (a, b) in levels.iter().zip(loaded.iter()) {
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.tier, b.tier);
            assert_eq!(a.price, b.price);
            assert_eq!(a.touch_count, b.touch_count);
            assert_eq!(a.last_touched_at, b.last_touched_at);
        }
    }

    #[test]
    fn labeled_rows_carry_the_proximity_column() {
        let path = temp_file("labeled.csv");
        let rows = vec![
            (sample_candle(0), ProximityLabel::Support(1)),
            (sample_candle(1), ProximityLabel::No),
        ];
        write_labeled_csv(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().ends_with("SR_Proximity"));
        assert!(lines.next().unwrap().ends_with(",S1"));
        assert!(lines.next().unwrap().ends_with(",No"));
    }
}
