//! Timetable rendering.

use super::shapes::{Schedule, SlotRecord};

const DEFAULT_TITLE: &str = "Timetable update";
const PLACEHOLDER: &str = "-";

/// Title line, optional `Date:` line, then one line per slot.
pub fn render_schedule(schedule: &Schedule) -> String {
    let mut lines = Vec::with_capacity(schedule.slots.len() + 2);

    let title = schedule.template.as_deref().unwrap_or("").trim();
    lines.push(if title.is_empty() { DEFAULT_TITLE } else { title }.to_string());

    let date = schedule.date.as_deref().unwrap_or("").trim();
    if !date.is_empty() {
        lines.push(format!("Date: {date}"));
    }

    lines.extend(schedule.slots.iter().map(render_slot));
    lines.join("\n")
}

fn render_slot(slot: &SlotRecord) -> String {
    format!(
        "{}. {} ({}-{}) @ {} [{}]",
        slot.slot_index,
        or_placeholder(slot.course_code.as_deref()),
        or_placeholder(slot.start_time.as_deref()),
        or_placeholder(slot.end_time.as_deref()),
        or_placeholder(slot.venue.as_deref()),
        or_placeholder(slot.status.as_deref()),
    )
}

fn or_placeholder(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => PLACEHOLDER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn slot(index: i64, course: &str, venue: &str) -> SlotRecord {
        SlotRecord {
            slot_index: index,
            course_code: Some(course.to_string()),
            start_time: Some("09:00".to_string()),
            end_time: Some("10:00".to_string()),
            venue: Some(venue.to_string()),
            status: Some("confirmed".to_string()),
        }
    }

    #[test]
    fn renders_title_date_and_slots() {
        let schedule = Schedule {
            target_room_id: Some("!r:x".into()),
            template: Some("  Today ".into()),
            date: Some("2024-05-01".into()),
            slots: vec![slot(1, "CS101", "Room A"), slot(2, "MA201", "Hall 3")],
        };
        assert_eq!(
            render_schedule(&schedule),
            "Today\nDate: 2024-05-01\n\
             1. CS101 (09:00-10:00) @ Room A [confirmed]\n\
             2. MA201 (09:00-10:00) @ Hall 3 [confirmed]"
        );
    }

    #[test]
    fn empty_template_and_date_fall_back() {
        let schedule = Schedule {
            template: Some("   ".into()),
            date: Some(" ".into()),
            ..Default::default()
        };
        assert_eq!(render_schedule(&schedule), "Timetable update");
    }

    #[rstest]
    #[case::missing(None)]
    #[case::empty(Some(""))]
    #[case::whitespace(Some(" \t "))]
    fn blank_slot_fields_render_as_placeholder(#[case] value: Option<&str>) {
        let s = SlotRecord {
            slot_index: 3,
            course_code: value.map(String::from),
            start_time: value.map(String::from),
            end_time: value.map(String::from),
            venue: value.map(String::from),
            status: value.map(String::from),
        };
        assert_eq!(render_slot(&s), "3. - (---) @ - [-]");
    }
}
