//! Mise en forme du résumé d'une playlist ("3 videos, 12 minutes")

use crate::items::ItemsSummary;

const MINUTES_PER_HOUR: u64 = 60;
const MINUTES_PER_DAY: u64 = 1440;

/// Au-delà de 3 heures, la durée est exprimée en heures
const HOURS_THRESHOLD_MINUTES: u64 = 180;

/// Au-delà de 3 jours, la durée est exprimée en jours
const DAYS_THRESHOLD_MINUTES: u64 = 4320;

/// Libellés utilisés dans le texte de résumé
///
/// Les valeurs par défaut sont en anglais ; un appelant localisé fournit
/// ses propres libellés.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLabels {
    pub video: String,
    pub videos: String,
    pub minute: String,
    pub minutes: String,
    pub hours: String,
    pub days: String,
}

impl Default for DisplayLabels {
    fn default() -> Self {
        Self {
            video: "video".into(),
            videos: "videos".into(),
            minute: "minute".into(),
            minutes: "minutes".into(),
            hours: "hours".into(),
            days: "days".into(),
        }
    }
}

/// Formate une durée totale en minutes, heures ou jours (arrondi inférieur)
pub fn format_duration(total_secs: u64, labels: &DisplayLabels) -> String {
    let minutes = total_secs / 60;

    if minutes == 1 {
        format!("{} {}", minutes, labels.minute)
    } else if minutes > DAYS_THRESHOLD_MINUTES {
        format!("{} {}", minutes / MINUTES_PER_DAY, labels.days)
    } else if minutes > HOURS_THRESHOLD_MINUTES {
        format!("{} {}", minutes / MINUTES_PER_HOUR, labels.hours)
    } else {
        format!("{} {}", minutes, labels.minutes)
    }
}

/// Texte de résumé : `{count} {video|videos}, {durée}`
pub fn format_display_info(summary: &ItemsSummary, labels: &DisplayLabels) -> String {
    let noun = if summary.count == 1 {
        &labels.video
    } else {
        &labels.videos
    };
    format!(
        "{} {}, {}",
        summary.count,
        noun,
        format_duration(summary.total_duration_secs, labels)
    )
}
