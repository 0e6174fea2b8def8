use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;

use crate::digest::report::Period;
use crate::pipeline::DigestPipeline;

/// One scheduled firing definition: when (minute granularity, in the
/// configured zone) and with what lookback window.
#[derive(Debug, Clone, Copy)]
pub struct RunTrigger {
    pub period: Period,
    pub fire_at: NaiveTime,
    pub cutoff_hours: u32,
}

/// The next decision the scheduler made: fire `period` at `at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextFire {
    pub at: DateTime<Utc>,
    pub period: Period,
    pub cutoff_hours: u32,
    local_date: NaiveDate,
}

/// Decides which pipeline run executes next. Owned by the entry point,
/// single-threaded access; runs execute strictly one at a time because
/// the loop awaits each run before computing the next firing. A firing
/// missed while the process was down is simply skipped.
pub struct RunScheduler {
    triggers: Vec<RunTrigger>,
    tz: Tz,
    fired: HashMap<Period, NaiveDate>,
}

impl RunScheduler {
    pub fn new(triggers: Vec<RunTrigger>, tz: Tz) -> Self {
        Self {
            triggers,
            tz,
            fired: HashMap::new(),
        }
    }

    /// Earliest trigger instant strictly after `now` that has not
    /// already fired for its local date. Looks up to two days ahead so
    /// a nonexistent local time (DST gap) skips to the next day.
    pub fn next_fire(&self, now: DateTime<Utc>) -> Option<NextFire> {
        let local_now = now.with_timezone(&self.tz);

        let mut best: Option<NextFire> = None;
        for trigger in &self.triggers {
            for day_offset in 0..3 {
                let date = local_now.date_naive() + Duration::days(day_offset);
                if self.fired.get(&trigger.period) == Some(&date) {
                    continue;
                }
                let Some(local) = date
                    .and_time(trigger.fire_at)
                    .and_local_timezone(self.tz)
                    .earliest()
                else {
                    continue;
                };
                let at = local.with_timezone(&Utc);
                if at <= now {
                    continue;
                }
                let candidate = NextFire {
                    at,
                    period: trigger.period,
                    cutoff_hours: trigger.cutoff_hours,
                    local_date: date,
                };
                if best.map_or(true, |b| candidate.at < b.at) {
                    best = Some(candidate);
                }
                break;
            }
        }
        best
    }

    /// Record that a firing ran, so the same (period, date) pair cannot
    /// fire twice even if the run finishes within the trigger minute.
    pub fn mark_fired(&mut self, fire: &NextFire) {
        self.fired.insert(fire.period, fire.local_date);
    }

    /// The persistent wait loop: sleep until the next trigger, execute
    /// one run to completion, log the outcome, repeat. A failed run
    /// never takes the loop down; the next firing is the retry.
    pub async fn run_forever(mut self, pipeline: &DigestPipeline) {
        loop {
            let now = Utc::now();
            let Some(fire) = self.next_fire(now) else {
                tracing::error!("No schedulable trigger, stopping scheduler");
                return;
            };

            let wait = (fire.at - now).to_std().unwrap_or_default();
            tracing::info!(
                period = %fire.period,
                at = %fire.at,
                wait_secs = wait.as_secs(),
                "Waiting for next trigger"
            );
            tokio::time::sleep(wait).await;

            self.mark_fired(&fire);
            match pipeline.run(fire.period, fire.cutoff_hours).await {
                Ok(outcome) => {
                    tracing::info!(period = %fire.period, ?outcome, "Scheduled run finished");
                }
                Err(e) => {
                    tracing::error!(
                        period = %fire.period,
                        stage = e.stage(),
                        "Scheduled run failed: {e}"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn triggers() -> Vec<RunTrigger> {
        vec![
            RunTrigger {
                period: Period::Morning,
                fire_at: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
                cutoff_hours: 12,
            },
            RunTrigger {
                period: Period::Evening,
                fire_at: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
                cutoff_hours: 10,
            },
        ]
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_before_morning_fires_morning_today() {
        let sched = RunScheduler::new(triggers(), chrono_tz::UTC);
        let fire = sched.next_fire(utc(2026, 8, 10, 5, 30)).unwrap();
        assert_eq!(fire.period, Period::Morning);
        assert_eq!(fire.at, utc(2026, 8, 10, 7, 0));
        assert_eq!(fire.cutoff_hours, 12);
    }

    #[test]
    fn test_midday_fires_evening_today() {
        let sched = RunScheduler::new(triggers(), chrono_tz::UTC);
        let fire = sched.next_fire(utc(2026, 8, 10, 12, 0)).unwrap();
        assert_eq!(fire.period, Period::Evening);
        assert_eq!(fire.at, utc(2026, 8, 10, 21, 0));
        assert_eq!(fire.cutoff_hours, 10);
    }

    #[test]
    fn test_after_evening_fires_morning_tomorrow() {
        let sched = RunScheduler::new(triggers(), chrono_tz::UTC);
        let fire = sched.next_fire(utc(2026, 8, 10, 22, 15)).unwrap();
        assert_eq!(fire.period, Period::Morning);
        assert_eq!(fire.at, utc(2026, 8, 11, 7, 0));
    }

    #[test]
    fn test_exact_trigger_instant_is_not_refired() {
        // At exactly 07:00 the firing belongs to the wakeup that was
        // already scheduled for it; next_fire moves on.
        let sched = RunScheduler::new(triggers(), chrono_tz::UTC);
        let fire = sched.next_fire(utc(2026, 8, 10, 7, 0)).unwrap();
        assert_eq!(fire.period, Period::Evening);
    }

    #[test]
    fn test_mark_fired_skips_to_next_day() {
        let mut sched = RunScheduler::new(triggers(), chrono_tz::UTC);
        let fire = sched.next_fire(utc(2026, 8, 10, 6, 59)).unwrap();
        assert_eq!(fire.at, utc(2026, 8, 10, 7, 0));
        sched.mark_fired(&fire);

        // Still inside the trigger minute after a fast run: morning must
        // not fire again today.
        let next = sched.next_fire(utc(2026, 8, 10, 6, 59)).unwrap();
        assert_eq!(next.period, Period::Evening);

        let after_evening = sched.next_fire(utc(2026, 8, 10, 21, 30)).unwrap();
        assert_eq!(after_evening.period, Period::Morning);
        assert_eq!(after_evening.at, utc(2026, 8, 11, 7, 0));
    }

    #[test]
    fn test_configured_timezone_offsets_fire_instant() {
        let sched = RunScheduler::new(triggers(), chrono_tz::Europe::Berlin);
        // 07:00 Berlin summer time is 05:00 UTC.
        let fire = sched.next_fire(utc(2026, 8, 10, 3, 0)).unwrap();
        assert_eq!(fire.period, Period::Morning);
        assert_eq!(fire.at, utc(2026, 8, 10, 5, 0));
    }
}
