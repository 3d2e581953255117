use crate::error::ToolError;
use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleDay {
    pub day: usize,
    pub lessons: Vec<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub lessons_per_day: usize,
    pub total_lessons: usize,
    pub total_days: usize,
    pub days: Vec<ScheduleDay>,
}

/// Every element of every `lessons` array, depth-first in document order.
/// A bare top-level array is itself the lesson list.
pub fn flatten_lessons(curriculum: &JsonValue) -> Vec<JsonValue> {
    let mut lessons = Vec::new();
    collect_lessons(curriculum, &mut lessons);
    if lessons.is_empty() {
        if let JsonValue::Array(items) = curriculum {
            return items.clone();
        }
    }
    lessons
}

fn collect_lessons(value: &JsonValue, out: &mut Vec<JsonValue>) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                match child {
                    JsonValue::Array(items) if key == "lessons" => out.extend(items.iter().cloned()),
                    _ => collect_lessons(child, out),
                }
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                collect_lessons(item, out);
            }
        }
        _ => {}
    }
}

/// Chunks the curriculum's lessons into consecutive day buckets.
/// Fails when the day numbers starting at `start_day` would overflow.
pub fn build_schedule(
    curriculum: &JsonValue,
    lessons_per_day: usize,
    start_day: usize
) -> Result<Schedule, ToolError> {
    let lessons_per_day = lessons_per_day.max(1);
    let lessons = flatten_lessons(curriculum);
    let days = lessons
        .chunks(lessons_per_day)
        .enumerate()
        .map(|(i, chunk)| {
            let day = start_day
                .checked_add(i)
                .ok_or_else(|| ToolError::InvalidArgument(format!("startDay {} is too large", start_day)))?;
            Ok(ScheduleDay { day, lessons: chunk.to_vec() })
        })
        .collect::<Result<Vec<_>, ToolError>>()?;
    Ok(Schedule {
        lessons_per_day,
        total_lessons: lessons.len(),
        total_days: days.len(),
        days,
    })
}
