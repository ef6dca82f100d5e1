use anyhow::{Result, bail};
use tabled::{Table, Tabled, settings::Style};

use phinpt_core::auth::{AuthGate, FileSlot};
use phinpt_core::models::{NewUser, UpdateUser};
use phinpt_core::service::TrainerService;

use super::helpers::{or_dash, print_deleted, print_json, resolve_user, truncate};

pub(crate) fn cmd_user_add(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    user: &NewUser,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    let created = service.add_user(user)?;

    if json {
        print_json(&created)?;
    } else {
        println!(
            "Added {} '{}' ({}), id {}",
            created.role, created.username, created.email, created.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_user_list(service: &mut TrainerService, gate: &AuthGate<FileSlot>, json: bool) -> Result<()> {
    gate.require_admin()?;
    service.fetch_users()?;
    let users = &service.state().users;

    if json {
        print_json(users)?;
    } else if users.is_empty() {
        eprintln!("No users yet. Use `phinpt user add` to create one.");
    } else {
        #[derive(Tabled)]
        struct UserRow {
            #[tabled(rename = "ID")]
            id: String,
            #[tabled(rename = "Username")]
            username: String,
            #[tabled(rename = "Name")]
            name: String,
            #[tabled(rename = "Email")]
            email: String,
            #[tabled(rename = "Phone")]
            phone: String,
            #[tabled(rename = "Role")]
            role: String,
            #[tabled(rename = "Since")]
            since: String,
        }

        let rows: Vec<UserRow> = users
            .iter()
            .map(|u| UserRow {
                id: u.id.clone(),
                username: u.username.clone(),
                name: truncate(&u.full_name, 25),
                email: u.email.clone(),
                phone: or_dash(u.phone.as_deref()),
                role: u.role.to_string(),
                since: u
                    .start_date
                    .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string()),
            })
            .collect();

        println!("{}", Table::new(&rows).with(Style::rounded()));
    }
    Ok(())
}

pub(crate) fn cmd_user_update(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    ident: &str,
    update: &UpdateUser,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    if update.username.is_none()
        && update.email.is_none()
        && update.full_name.is_none()
        && update.phone.is_none()
        && update.role.is_none()
        && update.avatar.is_none()
        && update.start_date.is_none()
        && update.password.is_none()
    {
        bail!("Nothing to update. Provide at least one field to change");
    }

    let id = resolve_user(service, ident)?.id;
    let updated = service.update_user(&id, update)?;

    if json {
        print_json(&updated)?;
    } else {
        println!("Updated {} ({})", updated.username, updated.id);
        if update.password.is_some() {
            println!("  Password changed");
        }
    }
    Ok(())
}

pub(crate) fn cmd_user_delete(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    ident: &str,
    json: bool,
) -> Result<()> {
    let me = gate.require_admin()?;
    let target = resolve_user(service, ident)?;
    if target.id == me.id {
        bail!("Refusing to delete the account you are signed in with");
    }
    service.delete_user(&target.id)?;
    print_deleted("user", &target.id, json);
    Ok(())
}
