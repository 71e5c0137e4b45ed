use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

#[derive(Debug, Clone)]
struct ScheduleEntry {
    time: NaiveTime,
    last_fired: Option<NaiveDate>,
}

/// Daily triggers at fixed times of day, each due at most once per calendar day.
#[derive(Debug, Clone, Default)]
pub struct DailySchedule {
    entries: Vec<ScheduleEntry>,
}

impl DailySchedule {
    /// Registers `times` at `now`. Times already past today first fire tomorrow.
    pub fn new(times: &[NaiveTime], now: NaiveDateTime) -> Self {
        let today = now.date();
        let entries = times
            .iter()
            .map(|&time| ScheduleEntry {
                time,
                last_fired: (now.time() >= time).then_some(today),
            })
            .collect();

        DailySchedule { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the triggers due at `now` and marks them fired for today.
    pub fn take_due(&mut self, now: NaiveDateTime) -> Vec<NaiveTime> {
        let today = now.date();
        let mut due = Vec::new();

        for entry in &mut self.entries {
            if now.time() >= entry.time && entry.last_fired != Some(today) {
                entry.last_fired = Some(today);
                due.push(entry.time);
            }
        }

        due
    }

    /// Next moment any trigger becomes due, for logging.
    pub fn next_due(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let today = now.date();
        self.entries
            .iter()
            .map(|entry| {
                let day = if entry.last_fired == Some(today) || now.time() > entry.time {
                    today.succ_opt().unwrap_or(today)
                } else {
                    today
                };
                day.and_time(entry.time)
            })
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn fires_once_per_day() {
        let mut schedule = DailySchedule::new(&[hm(9, 0)], at("2024-05-17", "08:00:00"));

        assert!(schedule.take_due(at("2024-05-17", "08:59:59")).is_empty());
        assert_eq!(schedule.take_due(at("2024-05-17", "09:00:00")), vec![hm(9, 0)]);
        // same moment, same loop iteration: not due again
        assert!(schedule.take_due(at("2024-05-17", "09:00:00")).is_empty());
        assert!(schedule.take_due(at("2024-05-17", "23:59:00")).is_empty());

        assert!(schedule.take_due(at("2024-05-18", "00:01:00")).is_empty());
        assert_eq!(schedule.take_due(at("2024-05-18", "09:04:00")), vec![hm(9, 0)]);
    }

    #[test]
    fn late_loop_still_fires_the_same_day() {
        let mut schedule = DailySchedule::new(&[hm(9, 0)], at("2024-05-17", "08:00:00"));
        // a slow fetch pushed the check past the scheduled minute
        assert_eq!(schedule.take_due(at("2024-05-17", "09:06:30")), vec![hm(9, 0)]);
    }

    #[test]
    fn times_already_passed_at_startup_wait_for_tomorrow() {
        let mut schedule =
            DailySchedule::new(&[hm(9, 0), hm(21, 0)], at("2024-05-17", "10:00:00"));

        assert!(schedule.take_due(at("2024-05-17", "10:00:01")).is_empty());
        assert_eq!(schedule.take_due(at("2024-05-17", "21:00:00")), vec![hm(21, 0)]);
        assert_eq!(schedule.take_due(at("2024-05-18", "09:00:00")), vec![hm(9, 0)]);
    }

    #[test]
    fn several_triggers_can_be_due_together() {
        let mut schedule =
            DailySchedule::new(&[hm(9, 0), hm(9, 30)], at("2024-05-17", "08:00:00"));
        assert_eq!(
            schedule.take_due(at("2024-05-17", "09:45:00")),
            vec![hm(9, 0), hm(9, 30)]
        );
    }

    #[test]
    fn empty_schedule_never_fires() {
        let mut schedule = DailySchedule::default();
        assert!(schedule.is_empty());
        assert!(schedule.take_due(at("2024-05-17", "09:00:00")).is_empty());
        assert!(schedule.next_due(at("2024-05-17", "09:00:00")).is_none());
    }

    #[test]
    fn next_due_rolls_over_midnight() {
        let schedule = DailySchedule::new(&[hm(9, 0), hm(21, 0)], at("2024-05-17", "22:00:00"));
        assert_eq!(
            schedule.next_due(at("2024-05-17", "22:00:00")),
            Some(at("2024-05-18", "09:00:00"))
        );
    }
}
