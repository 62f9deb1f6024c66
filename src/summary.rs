//! End-of-run report of every date/subject combination that was not
//! processed cleanly.

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The source returned nothing or failed; an absent record was
    /// synthesized in its place.
    SourceUnavailable(String),
    /// The record was built but every channel is absent.
    AllChannelsAbsent { kept: bool },
    /// Channels whose sample list could not be read.
    MalformedChannels(Vec<String>),
    /// Duplicate keys dropped while fusing.
    JoinAmbiguity(usize),
    /// Fused site rows dropped because no inverter matched them.
    RowsWithoutInverter(usize),
    /// The date/source could not be processed at all.
    Skipped(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::SourceUnavailable(reason) => write!(f, "source unavailable, synthesized absent ({})", reason),
            Outcome::AllChannelsAbsent { kept: true } => write!(f, "all channels absent, kept"),
            Outcome::AllChannelsAbsent { kept: false } => write!(f, "all channels absent, skipped"),
            Outcome::MalformedChannels(channels) => write!(f, "malformed channels: {}", channels.join(", ")),
            Outcome::JoinAmbiguity(dropped) => write!(f, "{} duplicate rows dropped keep-first", dropped),
            Outcome::RowsWithoutInverter(dropped) => write!(f, "{} fused rows with no inverter dropped", dropped),
            Outcome::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    pub date: NaiveDate,
    pub subject: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    entries: Vec<SummaryEntry>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, date: NaiveDate, subject: impl Into<String>, outcome: Outcome) {
        self.entries.push(SummaryEntry {
            date,
            subject: subject.into(),
            outcome,
        });
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[SummaryEntry] {
        &self.entries
    }

    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&Outcome) -> bool,
    {
        self.entries.iter().filter(|e| predicate(&e.outcome)).count()
    }

    pub fn print(&self) {
        println!("\n============== Run Summary ==============");
        if self.entries.is_empty() {
            println!("All dates and devices processed cleanly.");
        } else {
            let mut sorted: Vec<&SummaryEntry> = self.entries.iter().collect();
            sorted.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.subject.cmp(&b.subject)));
            for entry in sorted {
                println!("  {} {:<16} {}", entry.date, entry.subject, entry.outcome);
            }
        }
        println!("=========================================\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_count() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        let mut summary = RunSummary::new();
        assert!(summary.is_clean());
        summary.record(day, "10764334", Outcome::SourceUnavailable("timeout".into()));
        let mut other = RunSummary::new();
        other.record(day, "inverter 7", Outcome::AllChannelsAbsent { kept: true });
        summary.merge(other);

        assert_eq!(summary.entries().len(), 2);
        assert_eq!(
            summary.count_where(|o| matches!(o, Outcome::SourceUnavailable(_))),
            1
        );
        assert_eq!(
            summary.entries()[1].outcome.to_string(),
            "all channels absent, kept"
        );
    }
}
