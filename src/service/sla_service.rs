// service/sla_service.rs
use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use uuid::Uuid;

use crate::{
    config::SlaSettings,
    db::Store,
    models::{
        agentmodel::{SlaPolicy, SlaTarget},
        departmentmodel::{BusinessHours, Department},
        ticketmodel::{Ticket, TicketPriority},
    },
};

/// Longest stretch scanned for a working window before giving up on the calendar.
const MAX_CALENDAR_DAYS: i64 = 366 * 2;

/// `None` when the offset does not fit a timestamp.
fn offset_minutes(start: DateTime<Utc>, minutes: i64) -> Option<DateTime<Utc>> {
    Duration::try_minutes(minutes).and_then(|delta| start.checked_add_signed(delta))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlaDeadlines {
    pub policy_id: Option<Uuid>,
    pub first_response_due: Option<DateTime<Utc>>,
    pub resolution_due: Option<DateTime<Utc>>,
}

impl SlaDeadlines {
    pub fn none() -> Self {
        SlaDeadlines {
            policy_id: None,
            first_response_due: None,
            resolution_due: None,
        }
    }

    pub fn apply_to(&self, ticket: &mut Ticket) {
        ticket.sla_policy_id = self.policy_id;
        ticket.first_response_due = self.first_response_due;
        ticket.resolution_due = self.resolution_due;
    }
}

/// Working windows per weekday (minutes from midnight, UTC) plus holidays.
#[derive(Debug, Clone, Default)]
pub struct WorkCalendar {
    windows: [Option<(u32, u32)>; 7],
    holidays: HashSet<NaiveDate>,
}

fn parse_clock(value: &str) -> Option<u32> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .ok()
        .map(|t| t.hour() * 60 + t.minute())
}

impl WorkCalendar {
    pub fn from_settings(settings: &SlaSettings) -> Self {
        let mut calendar = WorkCalendar::default();
        let start = settings.business_hours_start.min(24) * 60;
        let end = settings.business_hours_end.min(24) * 60;
        if end > start {
            for day in settings.work_days.iter().filter(|d| **d <= 6) {
                calendar.windows[*day as usize] = Some((start, end));
            }
        }
        calendar
    }

    /// `None` when the schedule is disabled.
    pub fn from_business_hours(hours: &BusinessHours) -> Option<Self> {
        if !hours.enabled {
            return None;
        }
        let mut calendar = WorkCalendar::default();
        for day in hours.schedule.iter().filter(|d| d.is_work_day && d.day <= 6) {
            if let (Some(start), Some(end)) = (parse_clock(&day.start_time), parse_clock(&day.end_time)) {
                if end > start {
                    calendar.windows[day.day as usize] = Some((start, end));
                }
            }
        }
        calendar.holidays = hours.holidays.iter().map(|h| h.date).collect();
        Some(calendar)
    }

    pub fn has_working_time(&self) -> bool {
        self.windows.iter().any(Option::is_some)
    }

    fn window_on(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if self.holidays.contains(&date) {
            return None;
        }
        let (start, end) = self.windows[date.weekday().num_days_from_sunday() as usize]?;
        let at = |minutes: u32| {
            let naive = date.and_hms_opt(0, 0, 0)? + Duration::minutes(minutes as i64);
            Some(Utc.from_utc_datetime(&naive))
        };
        Some((at(start)?, at(end)?))
    }

    /// Adds `minutes` of working time to `start`. Falls back to calendar
    /// time when the schedule has no working windows.
    pub fn add_minutes(&self, start: DateTime<Utc>, minutes: i64) -> Option<DateTime<Utc>> {
        if minutes <= 0 || !self.has_working_time() {
            return offset_minutes(start, minutes.max(0));
        }

        let mut remaining = minutes;
        let mut cursor = start;
        for _ in 0..MAX_CALENDAR_DAYS {
            let date = cursor.date_naive();
            if let Some((open, close)) = self.window_on(date) {
                if cursor < open {
                    cursor = open;
                }
                if cursor < close {
                    let available = (close - cursor).num_minutes();
                    if remaining <= available {
                        return offset_minutes(cursor, remaining);
                    }
                    remaining -= available;
                }
            }
            let next_day = match date.succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)) {
                Some(midnight) => midnight,
                None => break,
            };
            cursor = Utc.from_utc_datetime(&next_day);
        }

        offset_minutes(start, minutes)
    }
}

fn static_deadlines(settings: &SlaSettings, now: DateTime<Utc>) -> SlaDeadlines {
    let add = |hours: i64| Duration::try_hours(hours).and_then(|delta| now.checked_add_signed(delta));
    SlaDeadlines {
        policy_id: None,
        first_response_due: add(settings.default_response_hours),
        resolution_due: add(settings.default_resolve_hours),
    }
}

/// Pure deadline computation for one policy target, or the static offsets
/// when there is no target or the target does not fit a timestamp.
pub fn compute_deadlines(
    policy: Option<(&SlaPolicy, &SlaTarget)>,
    calendar: Option<&WorkCalendar>,
    settings: &SlaSettings,
    now: DateTime<Utc>,
) -> SlaDeadlines {
    let Some((policy, target)) = policy else {
        return static_deadlines(settings, now);
    };

    let add = |minutes: i64| match calendar.filter(|_| policy.use_business_hours) {
        Some(calendar) => calendar.add_minutes(now, minutes),
        None => offset_minutes(now, minutes),
    };
    match (add(target.first_response_mins), add(target.resolution_mins)) {
        (Some(first_response_due), Some(resolution_due)) => SlaDeadlines {
            policy_id: Some(policy.id),
            first_response_due: Some(first_response_due),
            resolution_due: Some(resolution_due),
        },
        _ => static_deadlines(settings, now),
    }
}

/// Turns ticket priority and department into due dates.
/// Order of precedence: department policy, tenant default policy, static hours.
#[derive(Clone)]
pub struct SlaService {
    store: Arc<dyn Store>,
    settings: SlaSettings,
}

impl SlaService {
    pub fn new(store: Arc<dyn Store>, settings: SlaSettings) -> Self {
        Self { store, settings }
    }

    /// Never fails: lookup errors fall through to the next source.
    pub async fn resolve(
        &self,
        tenant_id: &str,
        priority: TicketPriority,
        department: Option<&Department>,
        now: DateTime<Utc>,
    ) -> SlaDeadlines {
        if !self.settings.enabled {
            return SlaDeadlines::none();
        }

        let mut policy = None;
        if let Some(policy_id) = department.and_then(|d| d.sla_policy_id) {
            policy = self
                .store
                .get_sla_policy(tenant_id, policy_id)
                .await
                .ok()
                .flatten()
                .filter(|p| p.is_active && p.target_for(priority).is_some());
        }
        if policy.is_none() {
            policy = self
                .store
                .get_default_sla_policy(tenant_id)
                .await
                .ok()
                .flatten()
                .filter(|p| p.target_for(priority).is_some());
        }

        let calendar = department
            .and_then(|d| d.business_hours.as_ref())
            .and_then(WorkCalendar::from_business_hours)
            .unwrap_or_else(|| WorkCalendar::from_settings(&self.settings));

        let matched = policy
            .as_ref()
            .and_then(|p| p.target_for(priority).map(|target| (p, target)));
        compute_deadlines(matched, Some(&calendar), &self.settings, now)
    }

    pub async fn resolve_for_ticket(&self, ticket: &Ticket, now: DateTime<Utc>) -> SlaDeadlines {
        let department = match ticket.department_id {
            Some(department_id) => self
                .store
                .get_department(&ticket.tenant_id, department_id)
                .await
                .ok()
                .flatten(),
            None => None,
        };
        self.resolve(&ticket.tenant_id, ticket.priority, department.as_ref(), now)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{departmentdb::DepartmentExt, memory::MemoryStore, sladb::SlaPolicyExt},
        models::departmentmodel::{DaySchedule, Holiday},
        service::test_support::*,
    };

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn service(store: Arc<MemoryStore>) -> SlaService {
        SlaService::new(store, SlaSettings::default())
    }

    #[tokio::test]
    async fn static_offsets_without_any_policy() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        let deadlines = service(store).resolve(TENANT, TicketPriority::High, None, now).await;

        assert_eq!(deadlines.policy_id, None);
        assert_eq!(deadlines.first_response_due, Some(now + Duration::hours(24)));
        assert_eq!(deadlines.resolution_due, Some(now + Duration::hours(72)));
    }

    #[tokio::test]
    async fn department_policy_wins_over_default() {
        let store = Arc::new(MemoryStore::new());
        let default = store.create_sla_policy(&policy("Default", true, 60, 600)).await.unwrap();
        let dept_policy = store.create_sla_policy(&policy("Gold", false, 240, 1440)).await.unwrap();
        let mut dept = department("Billing");
        dept.sla_policy_id = Some(dept_policy.id);
        let dept = store.create_department(&dept).await.unwrap();
        let now = Utc::now();

        let deadlines = service(store.clone())
            .resolve(TENANT, TicketPriority::High, Some(&dept), now)
            .await;

        assert_eq!(deadlines.policy_id, Some(dept_policy.id));
        assert_ne!(deadlines.policy_id, Some(default.id));
        assert_eq!(deadlines.first_response_due, Some(now + Duration::minutes(240)));
        assert_eq!(deadlines.resolution_due, Some(now + Duration::minutes(1440)));
    }

    #[tokio::test]
    async fn falls_back_to_default_policy() {
        let store = Arc::new(MemoryStore::new());
        let default = store.create_sla_policy(&policy("Default", true, 60, 600)).await.unwrap();
        let dept = store.create_department(&department("Sales")).await.unwrap();
        let now = Utc::now();

        let deadlines = service(store)
            .resolve(TENANT, TicketPriority::High, Some(&dept), now)
            .await;

        assert_eq!(deadlines.policy_id, Some(default.id));
        assert_eq!(deadlines.first_response_due, Some(now + Duration::minutes(60)));
    }

    #[tokio::test]
    async fn inactive_or_targetless_policies_fall_through() {
        let store = Arc::new(MemoryStore::new());
        let mut inactive = policy("Old", false, 5, 10);
        inactive.is_active = false;
        let inactive = store.create_sla_policy(&inactive).await.unwrap();
        let mut dept = department("Legacy");
        dept.sla_policy_id = Some(inactive.id);
        let dept = store.create_department(&dept).await.unwrap();
        let now = Utc::now();

        // The default policy only covers `high`, so `low` lands on the static offsets.
        store.create_sla_policy(&policy("Default", true, 60, 600)).await.unwrap();
        let deadlines = service(store)
            .resolve(TENANT, TicketPriority::Low, Some(&dept), now)
            .await;

        assert_eq!(deadlines.policy_id, None);
        assert_eq!(deadlines.first_response_due, Some(now + Duration::hours(24)));
    }

    #[tokio::test]
    async fn disabled_sla_sets_no_dates() {
        let store = Arc::new(MemoryStore::new());
        let settings = SlaSettings {
            enabled: false,
            ..SlaSettings::default()
        };
        let deadlines = SlaService::new(store, settings)
            .resolve(TENANT, TicketPriority::Urgent, None, Utc::now())
            .await;
        assert_eq!(deadlines, SlaDeadlines::none());
    }

    #[tokio::test]
    async fn resolution_is_idempotent_for_a_fixed_clock() {
        let store = Arc::new(MemoryStore::new());
        store.create_sla_policy(&policy("Default", true, 90, 900)).await.unwrap();
        let sla = service(store);
        let now = Utc::now();

        let first = sla.resolve(TENANT, TicketPriority::High, None, now).await;
        let second = sla.resolve(TENANT, TicketPriority::High, None, now).await;
        assert_eq!(first, second);
    }

    #[test]
    fn business_minutes_roll_over_the_weekend() {
        let calendar = WorkCalendar::from_settings(&SlaSettings::default());
        // 2024-03-01 is a Friday.
        let friday_four_pm = at(2024, 3, 1, 16, 0);
        assert_eq!(calendar.add_minutes(friday_four_pm, 120), Some(at(2024, 3, 4, 10, 0)));
    }

    #[test]
    fn business_minutes_start_at_opening_time() {
        let calendar = WorkCalendar::from_settings(&SlaSettings::default());
        let monday_early = at(2024, 3, 4, 6, 30);
        assert_eq!(calendar.add_minutes(monday_early, 30), Some(at(2024, 3, 4, 9, 30)));
    }

    #[test]
    fn holidays_are_skipped() {
        let hours = BusinessHours {
            enabled: true,
            timezone: "UTC".into(),
            schedule: (1..=5)
                .map(|day| DaySchedule {
                    day,
                    is_work_day: true,
                    start_time: "08:00".into(),
                    end_time: "12:00".into(),
                })
                .collect(),
            holidays: vec![Holiday {
                date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
                name: "Founders day".into(),
            }],
        };
        let calendar = WorkCalendar::from_business_hours(&hours).unwrap();
        // Monday 11:00 + 2h: one hour Monday, Tuesday is a holiday, one hour Wednesday.
        assert_eq!(calendar.add_minutes(at(2024, 3, 4, 11, 0), 120), Some(at(2024, 3, 6, 9, 0)));
    }

    #[test]
    fn empty_schedule_uses_calendar_time() {
        let calendar = WorkCalendar::default();
        let now = at(2024, 3, 2, 10, 0);
        assert_eq!(calendar.add_minutes(now, 45), Some(now + Duration::minutes(45)));
    }

    #[test]
    fn business_hours_only_apply_when_policy_asks() {
        let settings = SlaSettings::default();
        let calendar = WorkCalendar::from_settings(&settings);
        let mut p = policy("Biz", false, 120, 240);
        let saturday = at(2024, 3, 2, 10, 0);
        let target = p.targets[0].clone();

        let linear = compute_deadlines(Some((&p, &target)), Some(&calendar), &settings, saturday);
        assert_eq!(linear.first_response_due, Some(saturday + Duration::minutes(120)));

        p.use_business_hours = true;
        let business = compute_deadlines(Some((&p, &target)), Some(&calendar), &settings, saturday);
        assert_eq!(business.first_response_due, Some(at(2024, 3, 4, 11, 0)));
    }

    #[test]
    fn oversized_targets_fall_back_to_static_offsets() {
        let settings = SlaSettings::default();
        let calendar = WorkCalendar::from_settings(&settings);
        let mut p = policy("Huge", true, 1_000_000_000_000, 1_000_000_000_000);
        let target = p.targets[0].clone();
        let now = at(2024, 3, 4, 10, 0);

        for use_business_hours in [false, true] {
            p.use_business_hours = use_business_hours;
            let deadlines = compute_deadlines(Some((&p, &target)), Some(&calendar), &settings, now);
            assert_eq!(deadlines.policy_id, None);
            assert_eq!(deadlines.first_response_due, Some(now + Duration::hours(24)));
            assert_eq!(deadlines.resolution_due, Some(now + Duration::hours(72)));
        }
    }

    #[tokio::test]
    async fn oversized_default_policy_still_resolves() {
        let store = Arc::new(MemoryStore::new());
        let mut p = policy("Huge", true, 1_000_000_000_000, 1_000_000_000_000);
        p.targets[0].priority = TicketPriority::Medium;
        store.create_sla_policy(&p).await.unwrap();
        let now = Utc::now();

        let deadlines = service(store).resolve(TENANT, TicketPriority::Medium, None, now).await;

        assert_eq!(deadlines.first_response_due, Some(now + Duration::hours(24)));
        assert_eq!(deadlines.resolution_due, Some(now + Duration::hours(72)));
    }
}
