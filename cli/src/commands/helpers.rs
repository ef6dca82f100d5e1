use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{self, BufRead, Write};
use std::path::Path;

use phinpt_core::auth::{AuthGate, SessionSlot};
use phinpt_core::error::is_not_found;
use phinpt_core::models::User;
use phinpt_core::service::TrainerService;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Read a JSON document (a plan definition, usually) from disk.
pub(crate) fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Use `given`, or ask for a password on stderr and read one line of stdin.
pub(crate) fn password_or_prompt(given: Option<String>) -> Result<String> {
    if let Some(p) = given {
        return Ok(p);
    }
    eprint!("Password: ");
    io::stderr().flush()?;
    let line = io::stdin().lock().lines().next().context("No input")??;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Find a user by id, username or email.
pub(crate) fn resolve_user(service: &TrainerService, ident: &str) -> Result<User> {
    match service.get_user(ident) {
        Ok(user) => return Ok(user),
        Err(e) if is_not_found(&e) => {}
        Err(e) => return Err(e),
    }
    service
        .db()
        .list_users()?
        .into_iter()
        .find(|u| u.username == ident || u.email.eq_ignore_ascii_case(ident))
        .map_or_else(|| service.get_user(ident), Ok)
}

/// Which client's rows a read may cover. Admins may name anyone or nobody
/// (meaning everyone); clients are pinned to themselves.
pub(crate) fn client_scope<S: SessionSlot>(
    service: &TrainerService,
    gate: &AuthGate<S>,
    requested: Option<&str>,
) -> Result<Option<String>> {
    let user = gate.require_user()?;
    if user.is_admin() {
        return requested
            .map(|ident| resolve_user(service, ident).map(|u| u.id))
            .transpose();
    }
    if let Some(ident) = requested {
        let target = resolve_user(service, ident)?;
        if target.id != user.id {
            bail!("Clients can only access their own data");
        }
    }
    Ok(Some(user.id.clone()))
}

/// The client a write acts on: admins must name one, clients act on themselves.
pub(crate) fn write_target<S: SessionSlot>(
    service: &TrainerService,
    gate: &AuthGate<S>,
    requested: Option<&str>,
) -> Result<String> {
    let user = gate.require_user()?;
    match (user.is_admin(), requested) {
        (true, Some(ident)) => Ok(resolve_user(service, ident)?.id),
        (true, None) => bail!("Admins must pass --client to choose whose data to change"),
        (false, _) => client_scope(service, gate, requested)
            .map(|scope| scope.unwrap_or_else(|| user.id.clone())),
    }
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn print_deleted(kind: &str, id: &str, json: bool) {
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted {kind} {id}");
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

pub(crate) fn or_dash(value: Option<&str>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or("-").to_string()
}
