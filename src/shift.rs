//! Shifts, as stored in the `shifts` collection

use std::fmt::{Display, Formatter};

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::config::SHIFTS;
use crate::error::StoreError;
use crate::record::{Document, RecordId};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// The kinds of shift
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftType {
    /// On call
    Guardia,
    /// Consultation
    Consulta,
    Emergencia,
    /// Rest
    Descanso,
}

impl Display for ShiftType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        let name = match self {
            ShiftType::Guardia => "guardia",
            ShiftType::Consulta => "consulta",
            ShiftType::Emergencia => "emergencia",
            ShiftType::Descanso => "descanso",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for ShiftType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "guardia" => Ok(ShiftType::Guardia),
            "consulta" => Ok(ShiftType::Consulta),
            "emergencia" => Ok(ShiftType::Emergencia),
            "descanso" => Ok(ShiftType::Descanso),
            other => Err(StoreError::InvalidResponse(format!("unknown shift type {:?}", other))),
        }
    }
}


/// A shift of a doctor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    /// `None` until the shift has been saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RecordId>,

    /// The doctor this shift belongs to. This is not checked against the doctors collection
    doctor_id: String,
    /// Calendar date (e.g. `2024-03-01`)
    date: String,
    #[serde(rename = "type")]
    shift_type: ShiftType,
    /// Time of day (`HH:MM`)
    start_time: String,
    /// Time of day (`HH:MM`). An end before the start means the shift ends the next day
    end_time: String,
    #[serde(default)]
    notes: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

impl Shift {
    /// A shift that has not been saved yet
    pub fn new(doctor_id: String, date: String, shift_type: ShiftType, start_time: String, end_time: String) -> Self {
        Self {
            id: None,
            doctor_id,
            date,
            shift_type,
            start_time,
            end_time,
            notes: String::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_notes(mut self, notes: String) -> Self {
        self.notes = notes;
        self
    }

    pub fn doctor_id(&self) -> &str             { &self.doctor_id }
    pub fn date(&self) -> &str                  { &self.date }
    pub fn shift_type(&self) -> ShiftType       { self.shift_type }
    pub fn start_time(&self) -> &str            { &self.start_time }
    pub fn end_time(&self) -> &str              { &self.end_time }
    pub fn notes(&self) -> &str                 { &self.notes }
    pub fn created_at(&self) -> Option<&str>    { self.created_at.as_deref() }
    pub fn updated_at(&self) -> Option<&str>    { self.updated_at.as_deref() }

    pub fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    /// Start and end of this shift, in minutes since the start of its date.
    ///
    /// A shift that ends at or before its start time ends the next day, so its end is past `24 * 60`.
    /// Returns `None` when a time does not parse.
    pub fn time_range(&self) -> Option<(u32, u32)> {
        let start = minutes_of_day(&self.start_time)?;
        let end = minutes_of_day(&self.end_time)?;
        if end <= start {
            Some((start, end + MINUTES_PER_DAY))
        } else {
            Some((start, end))
        }
    }

    /// Whether `other` is a different shift of the same doctor whose time range intersects this one.
    ///
    /// An overnight shift spills into the next date, so shifts on adjacent dates can overlap.
    /// Shifts with unparsable times never overlap anything. When a date is not `YYYY-MM-DD`,
    /// only shifts with the very same date are compared.
    pub fn overlaps(&self, other: &Shift) -> bool {
        if self.doctor_id != other.doctor_id {
            return false;
        }
        if let (Some(a), Some(b)) = (&self.id, &other.id) {
            if a == b {
                return false;
            }
        }
        match (self.absolute_range(other), other.absolute_range(self)) {
            (Some((start_a, end_a)), Some((start_b, end_b))) => start_a < end_b && start_b < end_a,
            _ => false,
        }
    }

    /// `time_range`, shifted by the day of the date. `reference` is used to tell whether unparsable dates can be compared
    fn absolute_range(&self, reference: &Shift) -> Option<(i64, i64)> {
        let (start, end) = self.time_range()?;
        let day = match (day_number(&self.date), day_number(&reference.date)) {
            (Some(day), Some(_)) => day,
            _ if self.date == reference.date => 0,
            _ => return None,
        };
        let offset = day * i64::from(MINUTES_PER_DAY);
        Some((offset + i64::from(start), offset + i64::from(end)))
    }
}

impl Document for Shift {
    const COLLECTION: &'static str = SHIFTS;

    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }
}

/// The first shift of `existing` that `candidate` overlaps, if any
pub fn find_overlapping_shift<'a>(candidate: &Shift, existing: &'a [Shift]) -> Option<&'a Shift> {
    existing.iter().find(|shift| candidate.overlaps(shift))
}

fn day_number(date: &str) -> Option<i64> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()
        .map(|date| i64::from(date.num_days_from_ce()))
}

fn minutes_of_day(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    let time = NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()?;
    Some(time.hour() * 60 + time.minute())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::record::Record;

    fn shift(id: Option<&str>, doctor: &str, date: &str, start: &str, end: &str) -> Shift {
        let mut s = Shift::new(doctor.to_string(), date.to_string(), ShiftType::Guardia, start.to_string(), end.to_string());
        if let Some(id) = id {
            s.set_id(RecordId::parse(id).unwrap());
        }
        s
    }

    #[test]
    fn shift_from_record() {
        let record = Record::from_value(json!({
            "id": "s1",
            "doctorId": "42",
            "date": "2024-03-01",
            "type": "consulta",
            "startTime": "08:00",
            "endTime": "14:00",
        })).unwrap();
        let s = Shift::from_record(&record).unwrap();
        assert_eq!(s.shift_type(), ShiftType::Consulta);
        assert_eq!(s.doctor_id(), "42");
        assert_eq!(s.notes(), "");
        assert_eq!(s.time_range(), Some((8 * 60, 14 * 60)));

        let fields = s.to_fields().unwrap();
        assert_eq!(fields.get("type"), Some(&json!("consulta")));
        assert!(fields.get("id").is_none());
    }

    #[test]
    fn overnight_shifts_end_the_next_day() {
        let night = shift(None, "42", "2024-03-01", "22:00", "06:00");
        assert_eq!(night.time_range(), Some((22 * 60, 30 * 60)));
        assert_eq!(shift(None, "42", "2024-03-01", "nope", "06:00").time_range(), None);
    }

    #[test]
    fn overlapping_shifts() {
        let morning = shift(Some("a"), "42", "2024-03-01", "08:00", "14:00");
        let noon = shift(Some("b"), "42", "2024-03-01", "13:00", "15:00");
        let afternoon = shift(Some("c"), "42", "2024-03-01", "14:00", "20:00");
        let other_doctor = shift(Some("d"), "7", "2024-03-01", "08:00", "14:00");
        let other_day = shift(Some("e"), "42", "2024-03-02", "08:00", "14:00");

        assert!(morning.overlaps(&noon));
        assert!(noon.overlaps(&afternoon));
        assert!(morning.overlaps(&afternoon) == false);
        assert!(morning.overlaps(&other_doctor) == false);
        assert!(morning.overlaps(&other_day) == false);
        assert!(morning.overlaps(&morning.clone()) == false);

        let existing = vec![afternoon.clone(), noon.clone()];
        let candidate = shift(None, "42", "2024-03-01", "09:00", "13:30");
        assert_eq!(find_overlapping_shift(&candidate, &existing), Some(&noon));
        let free = shift(None, "42", "2024-03-01", "20:00", "21:00");
        assert_eq!(find_overlapping_shift(&free, &existing), None);
    }

    #[test]
    fn night_shifts_overlap_the_next_morning() {
        let night = shift(Some("n"), "42", "2024-03-01", "22:00", "06:00");
        let early = shift(Some("e"), "42", "2024-03-02", "05:00", "08:00");
        let relief = shift(Some("r"), "42", "2024-03-02", "06:00", "08:00");
        let evening_before = shift(Some("b"), "42", "2024-02-29", "20:00", "23:00");

        assert!(night.overlaps(&early));
        assert!(early.overlaps(&night));
        assert!(night.overlaps(&relief) == false);
        assert!(night.overlaps(&evening_before) == false);

        // Across a month end
        let last_night = shift(Some("l"), "42", "2024-02-29", "23:00", "01:00");
        let first_hour = shift(Some("f"), "42", "2024-03-01", "00:30", "02:00");
        assert!(last_night.overlaps(&first_hour));

        // Free-form dates are only compared to themselves
        let loose = shift(Some("x"), "42", "tomorrow", "05:00", "08:00");
        assert!(night.overlaps(&loose) == false);
        assert!(loose.overlaps(&shift(Some("y"), "42", "tomorrow", "07:00", "09:00")));
    }

    #[test]
    fn shift_types_parse() {
        assert_eq!(" Guardia ".parse::<ShiftType>().unwrap(), ShiftType::Guardia);
        assert!("vacaciones".parse::<ShiftType>().is_err());
        assert_eq!(ShiftType::Descanso.to_string(), "descanso");
    }
}
