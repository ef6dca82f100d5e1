use std::path::Path;

use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use phinpt_core::auth::{AuthGate, FileSlot};
use phinpt_core::models::{NewWorkoutPlan, WorkoutPlan};
use phinpt_core::service::TrainerService;

use super::helpers::{client_scope, print_deleted, print_json, read_json_file, resolve_user, truncate};

pub(crate) fn cmd_plan_list(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    client: Option<&str>,
    json: bool,
) -> Result<()> {
    let scope = client_scope(service, gate, client)?;
    service.fetch_workout_plans()?;
    service.fetch_users()?;
    let plans = service.workout_plans_for(scope.as_deref());

    if json {
        print_json(&plans)?;
    } else if plans.is_empty() {
        eprintln!("No workout plans found.");
    } else {
        #[derive(Tabled)]
        struct PlanRow {
            #[tabled(rename = "ID")]
            id: String,
            #[tabled(rename = "Name")]
            name: String,
            #[tabled(rename = "Client")]
            client: String,
            #[tabled(rename = "Week")]
            week: i64,
            #[tabled(rename = "Start")]
            start: String,
            #[tabled(rename = "Days")]
            days: usize,
            #[tabled(rename = "Exercises")]
            exercises: usize,
            #[tabled(rename = "By")]
            created_by: String,
        }

        let rows: Vec<PlanRow> = plans
            .iter()
            .map(|p| PlanRow {
                id: p.id.clone(),
                name: truncate(&p.name, 30),
                client: client_label(service, &p.client_id),
                week: p.week_number,
                start: p.start_date.format("%Y-%m-%d").to_string(),
                days: p.days.len(),
                exercises: p.exercise_count(),
                created_by: p.created_by.to_string(),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
            .with(Modify::new(Columns::new(5..7)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }
    Ok(())
}

/// Username when the user is known, otherwise the raw id.
fn client_label(service: &TrainerService, client_id: &str) -> String {
    service
        .state()
        .users
        .iter()
        .find(|u| u.id == client_id)
        .map_or_else(|| client_id.to_string(), |u| u.username.clone())
}

/// A plan as readable text, one line per set.
pub(crate) fn format_plan(plan: &WorkoutPlan) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} (week {}, from {})",
        plan.name,
        plan.week_number,
        plan.start_date.format("%Y-%m-%d")
    );
    for day in &plan.days {
        if day.is_rest_day {
            let _ = writeln!(out, "  {}. {} - rest", day.day_order, day.day_name);
            continue;
        }
        let _ = writeln!(out, "  {}. {}", day.day_order, day.day_name);
        for exercise in &day.exercises {
            let _ = writeln!(out, "     {}. {}", exercise.exercise_order, exercise.name);
            for set in &exercise.sets {
                let mut line = format!("        set {}: {} reps", set.set_number, set.reps);
                if let Some(weight) = set.weight {
                    let _ = write!(line, " @ {weight} kg");
                }
                if let Some(done) = set.reality {
                    let _ = write!(line, " (did {done})");
                }
                if let Some(volume) = set.volume {
                    let _ = write!(line, " vol {volume}");
                }
                let _ = writeln!(out, "{line}");
            }
        }
    }
    out
}

pub(crate) fn cmd_plan_show(
    service: &TrainerService,
    gate: &AuthGate<FileSlot>,
    id: &str,
    json: bool,
) -> Result<()> {
    let plan = service.db().get_workout_plan(id)?;
    client_scope(service, gate, Some(&plan.client_id))?;

    if json {
        print_json(&plan)?;
    } else {
        print!("{}", format_plan(&plan));
    }
    Ok(())
}

pub(crate) fn cmd_plan_create(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    file: &Path,
    client: Option<&str>,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    let mut plan: NewWorkoutPlan = read_json_file(file)?;
    let client = client.unwrap_or(&plan.client_id).to_string();
    plan.client_id = resolve_user(service, &client)?.id;

    let created = service.add_workout_plan(&plan)?;
    if json {
        print_json(&created)?;
    } else {
        println!(
            "Created plan '{}' (week {}) with {} days, id {}",
            created.name,
            created.week_number,
            created.days.len(),
            created.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_plan_delete(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    id: &str,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    service.delete_workout_plan(id)?;
    print_deleted("workout plan", id, json);
    Ok(())
}

pub(crate) fn cmd_plan_duplicate(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    id: &str,
    client: &str,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    let client_id = resolve_user(service, client)?.id;
    let copy = service.duplicate_workout_plan(id, &client_id)?;

    if json {
        print_json(&copy)?;
    } else {
        println!("Copied to '{}' for {client}, id {}", copy.name, copy.id);
    }
    Ok(())
}

/// Clients may roll their own plans forward; admins may roll anyone's.
pub(crate) fn cmd_plan_next_week(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    id: &str,
    json: bool,
) -> Result<()> {
    let user = gate.require_user()?;
    let template = service.db().get_workout_plan(id)?;
    if !user.is_admin() && template.client_id != user.id {
        bail!("Clients can only start a new week from their own plans");
    }

    let next = service.create_new_week_plan(&template.client_id, &template.id)?;
    if json {
        print_json(&next)?;
    } else {
        println!(
            "Started week {} of '{}' from {}, id {}",
            next.week_number,
            next.name,
            next.start_date.format("%Y-%m-%d"),
            next.id
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use phinpt_core::models::{Exercise, ExerciseSet, Role, WorkoutDay};

    #[test]
    fn test_format_plan() {
        let plan = WorkoutPlan {
            id: "p1".to_string(),
            name: "Strength".to_string(),
            client_id: "c1".to_string(),
            week_number: 2,
            start_date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            created_by: Role::Admin,
            created_at: String::new(),
            updated_at: String::new(),
            days: vec![
                WorkoutDay {
                    id: "d1".to_string(),
                    day_name: "Monday".to_string(),
                    day_order: 1,
                    is_rest_day: false,
                    exercises: vec![Exercise {
                        id: "e1".to_string(),
                        name: "Squat".to_string(),
                        exercise_order: 1,
                        sets: vec![ExerciseSet {
                            id: "s1".to_string(),
                            set_number: 1,
                            reps: 8,
                            reality: Some(7),
                            weight: Some(60.0),
                            volume: None,
                        }],
                    }],
                },
                WorkoutDay {
                    id: "d2".to_string(),
                    day_name: "Tuesday".to_string(),
                    day_order: 2,
                    is_rest_day: true,
                    exercises: vec![],
                },
            ],
        };

        let text = format_plan(&plan);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Strength (week 2, from 2024-05-06)");
        assert_eq!(lines[1], "  1. Monday");
        assert_eq!(lines[2], "     1. Squat");
        assert_eq!(lines[3], "        set 1: 8 reps @ 60 kg (did 7)");
        assert_eq!(lines[4], "  2. Tuesday - rest");
    }
}
