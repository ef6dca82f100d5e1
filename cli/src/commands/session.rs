use anyhow::{Result, bail};

use phinpt_core::auth::{AuthGate, FileSlot, setup_admin_user};
use phinpt_core::service::TrainerService;

use super::helpers::{password_or_prompt, print_json};

pub(crate) fn cmd_setup_admin(
    service: &mut TrainerService,
    username: &str,
    email: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = password_or_prompt(password)?;
    let admin = setup_admin_user(service.db(), username, email, &password)?;
    service.fetch_users()?;

    if json {
        print_json(&admin)?;
    } else {
        println!("Created admin '{}' ({})", admin.username, admin.email);
        println!("Sign in with `phinpt login {}`", admin.username);
    }
    Ok(())
}

pub(crate) fn cmd_login(
    service: &TrainerService,
    gate: &mut AuthGate<FileSlot>,
    identifier: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = password_or_prompt(password)?;
    if !gate.login(service.db(), identifier, &password)? {
        bail!("Invalid username/email or password");
    }
    let Some(user) = gate.user() else {
        bail!("Login did not produce a session");
    };

    if json {
        print_json(user)?;
    } else {
        println!("Signed in as {} ({})", user.username, user.role);
    }
    Ok(())
}

pub(crate) fn cmd_logout(gate: &mut AuthGate<FileSlot>, json: bool) -> Result<()> {
    let was = gate.user().map(|u| u.username.clone());
    gate.logout()?;

    if json {
        println!("{}", serde_json::json!({ "signed_out": was }));
    } else if let Some(name) = was {
        println!("Signed out {name}");
    } else {
        println!("Not signed in");
    }
    Ok(())
}

pub(crate) fn cmd_whoami(gate: &AuthGate<FileSlot>, json: bool) -> Result<()> {
    let user = gate.require_user()?;
    if json {
        print_json(user)?;
    } else {
        println!("{} <{}>", user.username, user.email);
        println!("  Name:  {}", user.full_name);
        println!("  Role:  {}", user.role);
        if let Some(ref phone) = user.phone {
            println!("  Phone: {phone}");
        }
        if let Some(start) = user.start_date {
            println!("  Start: {}", start.format("%Y-%m-%d"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_admin_then_login_and_logout() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = TrainerService::new_in_memory().unwrap();
        cmd_setup_admin(
            &mut service,
            "coach",
            "coach@phinpt.com",
            Some("secret1".to_string()),
            true,
        )
        .unwrap();
        assert_eq!(service.state().users.len(), 1);
        assert!(
            cmd_setup_admin(&mut service, "coach2", "c2@phinpt.com", Some("secret1".to_string()), true)
                .is_err()
        );

        let mut gate = AuthGate::new(FileSlot::new(dir.path().join("session.json")));
        let err = cmd_login(&service, &mut gate, "coach", Some("wrong".to_string()), true).unwrap_err();
        assert_eq!(err.to_string(), "Invalid username/email or password");
        assert!(cmd_whoami(&gate, true).is_err());

        cmd_login(&service, &mut gate, "COACH@phinpt.com", Some("secret1".to_string()), true).unwrap();
        assert!(gate.is_admin());
        cmd_whoami(&gate, true).unwrap();

        // A fresh process picks the session back up from disk.
        let restored = AuthGate::restore(FileSlot::new(dir.path().join("session.json")));
        assert_eq!(restored.user().map(|u| u.username.as_str()), Some("coach"));

        cmd_logout(&mut gate, true).unwrap();
        assert!(gate.user().is_none());
        let restored = AuthGate::restore(FileSlot::new(dir.path().join("session.json")));
        assert!(restored.user().is_none());
    }
}
