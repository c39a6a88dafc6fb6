use crate::models::WeeklyProgress;
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

/// Score shown on the patient dashboard for today's activity
pub fn daily_health_score(steps: i32, water_ml: i32, diet_score: i32) -> i32 {
    let mut score = 60;
    if steps > 5000 {
        score += 15;
    }
    if steps > 8000 {
        score += 10;
    }
    if water_ml > 1500 {
        score += 5;
    }
    if diet_score > 70 {
        score += 10;
    }
    score.min(100)
}

pub fn progress_color(score: i32) -> &'static str {
    match score {
        s if s >= 80 => "green",
        s if s >= 60 => "yellow",
        s if s >= 40 => "orange",
        _ => "red",
    }
}

/// Monday of the week containing `day`
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

/// Body mass index rounded to one decimal
pub fn bmi(weight_kg: f64, height_cm: f64) -> Option<f64> {
    if weight_kg <= 0.0 || height_cm <= 0.0 {
        return None;
    }
    let meters = height_cm / 100.0;
    Some((weight_kg / (meters * meters) * 10.0).round() / 10.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriageStatus {
    Critical,
    Monitor,
    Stable,
}

impl TriageStatus {
    pub fn from_heart_rate(heart_rate: Option<i32>) -> Self {
        match heart_rate {
            Some(hr) if hr > 120 => Self::Critical,
            Some(hr) if hr > 100 => Self::Monitor,
            _ => Self::Stable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::Monitor => "Monitor",
            Self::Stable => "Stable",
        }
    }

    pub fn matches_filter(&self, filter: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(filter)
    }
}

/// Average of this week's values against last week's
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VitalTrend {
    pub metric: &'static str,
    pub current_value: f64,
    pub unit: &'static str,
    pub trend: &'static str,
    pub change_percentage: f64,
}

pub fn vital_trend(
    metric: &'static str,
    unit: &'static str,
    current: &[f64],
    previous: &[f64],
) -> Option<VitalTrend> {
    if current.is_empty() {
        return None;
    }
    let avg = |values: &[f64]| values.iter().sum::<f64>() / values.len() as f64;
    let current_avg = avg(current);

    let change = if previous.is_empty() {
        0.0
    } else {
        let previous_avg = avg(previous);
        if previous_avg == 0.0 {
            0.0
        } else {
            (current_avg - previous_avg) / previous_avg * 100.0
        }
    };

    let trend = if change > 5.0 {
        "up"
    } else if change < -5.0 {
        "down"
    } else {
        "stable"
    };

    Some(VitalTrend {
        metric,
        current_value: (current_avg * 10.0).round() / 10.0,
        unit,
        trend,
        change_percentage: (change * 10.0).round() / 10.0,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Achievements {
    pub total_weeks_tracked: usize,
    pub green_weeks: usize,
    pub longest_green_streak: usize,
    pub achievements: Vec<&'static str>,
}

/// Badges earned from weekly progress sorted oldest first
pub fn achievements(weeks: &[WeeklyProgress]) -> Achievements {
    let green_weeks = weeks.iter().filter(|w| w.progress_color == "green").count();

    let mut longest = 0;
    let mut streak = 0;
    for week in weeks {
        if week.progress_color == "green" {
            streak += 1;
            longest = longest.max(streak);
        } else {
            streak = 0;
        }
    }

    let mut badges = Vec::new();
    if weeks.len() >= 4 {
        badges.push("4-Week Veteran");
    }
    if green_weeks >= 10 {
        badges.push("Health Champion");
    }
    if longest >= 4 {
        badges.push("Monthly Master");
    }
    if weeks.len() >= 52 {
        badges.push("Year of Health");
    }

    Achievements {
        total_weeks_tracked: weeks.len(),
        green_weeks,
        longest_green_streak: longest,
        achievements: badges,
    }
}

const DAILY_TIPS: [&str; 7] = [
    "Walking 30 minutes a day can lower blood pressure.",
    "Hydration is key! Drink water before every meal.",
    "Better sleep starts with a consistent bedtime routine.",
    "Reduce sugar intake to improve energy levels.",
    "Stretching daily improves flexibility and reduces pain.",
    "Mindfulness meditation can lower stress in 10 minutes.",
    "Eating slowly helps with digestion and weight control.",
];

/// One tip per calendar day
pub fn daily_tip(day: NaiveDate) -> &'static str {
    DAILY_TIPS[day.ordinal0() as usize % DAILY_TIPS.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn week(start: NaiveDate, color: &str) -> WeeklyProgress {
        WeeklyProgress {
            id: 0,
            user_id: 1,
            week_start_date: start,
            week_end_date: start + Duration::days(6),
            progress_score: 0,
            progress_color: color.to_string(),
            steps_goal: 10_000,
            sleep_goal: 480,
            water_goal: 2_000,
        }
    }

    #[test]
    fn daily_score_bonuses_and_cap() {
        assert_eq!(daily_health_score(0, 0, 0), 60);
        assert_eq!(daily_health_score(6000, 0, 0), 75);
        assert_eq!(daily_health_score(9000, 0, 0), 85);
        assert_eq!(daily_health_score(9000, 2000, 80), 100);
        assert_eq!(daily_health_score(5000, 1500, 70), 60);
    }

    #[test]
    fn color_thresholds() {
        assert_eq!(progress_color(80), "green");
        assert_eq!(progress_color(79), "yellow");
        assert_eq!(progress_color(60), "yellow");
        assert_eq!(progress_color(40), "orange");
        assert_eq!(progress_color(39), "red");
    }

    #[test]
    fn week_starts_on_monday() {
        let sunday = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(week_start(sunday), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(week_start(monday), monday);
    }

    #[test]
    fn bmi_rounding() {
        assert_eq!(bmi(70.0, 175.0), Some(22.9));
        assert_eq!(bmi(70.0, 0.0), None);
    }

    #[test]
    fn triage_thresholds() {
        assert_eq!(TriageStatus::from_heart_rate(Some(121)), TriageStatus::Critical);
        assert_eq!(TriageStatus::from_heart_rate(Some(120)), TriageStatus::Monitor);
        assert_eq!(TriageStatus::from_heart_rate(Some(100)), TriageStatus::Stable);
        assert_eq!(TriageStatus::from_heart_rate(None), TriageStatus::Stable);
        assert!(TriageStatus::Critical.matches_filter("critical"));
    }

    #[test]
    fn vital_trend_change() {
        let trend = vital_trend("Heart Rate", "bpm", &[110.0, 110.0], &[100.0]).unwrap();
        assert_eq!(trend.trend, "up");
        assert_eq!(trend.change_percentage, 10.0);
        assert!(vital_trend("Heart Rate", "bpm", &[], &[100.0]).is_none());
        assert_eq!(vital_trend("Heart Rate", "bpm", &[72.0], &[]).unwrap().trend, "stable");
    }

    #[test]
    fn badges_from_history() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let colors = ["green", "green", "red", "green", "green", "green", "green"];
        let weeks: Vec<_> = colors
            .iter()
            .enumerate()
            .map(|(i, c)| week(start + Duration::weeks(i as i64), c))
            .collect();

        let result = achievements(&weeks);
        assert_eq!(result.total_weeks_tracked, 7);
        assert_eq!(result.green_weeks, 6);
        assert_eq!(result.longest_green_streak, 4);
        assert_eq!(result.achievements, vec!["4-Week Veteran", "Monthly Master"]);
    }
}
