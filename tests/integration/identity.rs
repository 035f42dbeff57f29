//! User switching. The actual privilege drop needs root; those tests return
//! early otherwise.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use nix::unistd::{self, User};
use tempfile::TempDir;

use stepexec::process::{execute, CommandSpec, Identity};

fn unprivileged_user() -> Option<User> {
    if !unistd::geteuid().is_root() {
        return None;
    }
    ["nobody", "daemon"]
        .iter()
        .find_map(|name| User::from_name(name).ok().flatten())
        .filter(|user| !user.uid.is_root())
}

#[test]
fn test_resolve_current_user() {
    let me = User::from_uid(unistd::geteuid()).unwrap().unwrap();
    let identity = Identity::resolve(&me.name).unwrap();

    assert_eq!(identity.uid, me.uid);
    assert_eq!(identity.gid, me.gid);
    assert_eq!(identity.home, me.dir);
    assert!(identity.groups.contains(&me.gid));
}

#[test]
fn test_resolve_is_not_cached() {
    // Two lookups of a missing user must both hit the database and fail
    assert!(Identity::resolve("stepexec-missing-user").is_err());
    assert!(Identity::resolve("stepexec-missing-user").is_err());
}

#[test]
fn test_child_runs_with_target_ids() {
    let Some(user) = unprivileged_user() else {
        return;
    };

    let result = execute(CommandSpec::shell("id -u; id -g").user(user.name.clone())).unwrap();
    let lines: Vec<String> = result.stdout.to_text().lines().map(String::from).collect();

    assert_eq!(lines[0], user.uid.to_string());
    assert_eq!(lines[1], user.gid.to_string());
}

#[test]
fn test_child_sees_target_home_and_user() {
    let Some(user) = unprivileged_user() else {
        return;
    };

    let result = execute(
        CommandSpec::shell("echo \"$HOME|$USER|$LOGNAME\"").user(user.name.clone()),
    )
    .unwrap();

    assert_eq!(
        result.stdout_text(),
        format!("{}|{}|{}", user.dir.display(), user.name, user.name)
    );
}

#[test]
fn test_child_cannot_read_root_only_files() {
    let Some(user) = unprivileged_user() else {
        return;
    };

    let dir = TempDir::new().unwrap();
    fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).unwrap();
    let secret = dir.path().join("secret");
    fs::write(&secret, "root only").unwrap();

    let result = execute(
        CommandSpec::new(["cat", secret.to_str().unwrap()])
            .user(user.name)
            .check(false),
    )
    .unwrap();

    assert_ne!(result.exit_code, 0);
    assert!(result.stdout.is_empty());
}
