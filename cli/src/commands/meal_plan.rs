use std::path::Path;

use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use phinpt_core::auth::{AuthGate, FileSlot};
use phinpt_core::models::{MealPlan, NewMealPlan};
use phinpt_core::service::TrainerService;

use super::helpers::{client_scope, print_deleted, print_json, read_json_file, resolve_user, truncate};

pub(crate) fn cmd_meal_plan_list(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    client: Option<&str>,
    json: bool,
) -> Result<()> {
    let scope = client_scope(service, gate, client)?;
    service.fetch_meal_plans()?;
    let plans = service.meal_plans_for(scope.as_deref());

    if json {
        print_json(&plans)?;
    } else if plans.is_empty() {
        eprintln!("No meal plans found.");
    } else {
        #[derive(Tabled)]
        struct MealPlanRow {
            #[tabled(rename = "ID")]
            id: String,
            #[tabled(rename = "Name")]
            name: String,
            #[tabled(rename = "Client ID")]
            client_id: String,
            #[tabled(rename = "Meals")]
            meals: usize,
            #[tabled(rename = "kcal")]
            calories: i64,
            #[tabled(rename = "Notes")]
            notes: String,
        }

        let rows: Vec<MealPlanRow> = plans
            .iter()
            .map(|p| MealPlanRow {
                id: p.id.clone(),
                name: truncate(&p.name, 30),
                client_id: p.client_id.clone(),
                meals: p.meals.len(),
                calories: p.total_calories,
                notes: p.notes.as_deref().map(|n| truncate(n, 30)).unwrap_or_default(),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(3..5)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }
    Ok(())
}

pub(crate) fn format_meal_plan(plan: &MealPlan) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let _ = writeln!(out, "{} ({} kcal)", plan.name, plan.total_calories);
    if let Some(ref notes) = plan.notes {
        let _ = writeln!(out, "  {notes}");
    }
    for meal in &plan.meals {
        let _ = writeln!(
            out,
            "  {}. {} - {} kcal",
            meal.meal_order, meal.name, meal.total_calories
        );
        for food in &meal.foods {
            let _ = write!(
                out,
                "     - {} [{}] {} kcal",
                food.name, food.macro_type, food.calories
            );
            match food.notes {
                Some(ref n) => {
                    let _ = writeln!(out, " ({n})");
                }
                None => out.push('\n'),
            }
        }
    }
    out
}

pub(crate) fn cmd_meal_plan_show(
    service: &TrainerService,
    gate: &AuthGate<FileSlot>,
    id: &str,
    json: bool,
) -> Result<()> {
    let plan = service.db().get_meal_plan(id)?;
    client_scope(service, gate, Some(&plan.client_id))?;

    if json {
        print_json(&plan)?;
    } else {
        print!("{}", format_meal_plan(&plan));
    }
    Ok(())
}

pub(crate) fn cmd_meal_plan_create(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    file: &Path,
    client: Option<&str>,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    let mut plan: NewMealPlan = read_json_file(file)?;
    let client = client.unwrap_or(&plan.client_id).to_string();
    plan.client_id = resolve_user(service, &client)?.id;

    let created = service.add_meal_plan(&plan)?;
    if json {
        print_json(&created)?;
    } else {
        println!(
            "Created meal plan '{}' ({} meals, {} kcal), id {}",
            created.name,
            created.meals.len(),
            created.total_calories,
            created.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_meal_plan_delete(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    id: &str,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    service.delete_meal_plan(id)?;
    print_deleted("meal plan", id, json);
    Ok(())
}
