//! Child environment composition

use std::collections::BTreeMap;
use std::ffi::OsString;

use super::identity::Identity;

/// Build the exact environment the child will see.
///
/// Precedence, lowest to highest: `inherited`, the identity's
/// HOME/USER/LOGNAME, `overrides`.
pub(crate) fn compose_env<I>(
    inherited: I,
    identity: Option<&Identity>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<OsString, OsString>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut env: BTreeMap<OsString, OsString> = inherited.into_iter().collect();

    if let Some(identity) = identity {
        for (key, value) in identity.env_vars() {
            env.insert(key.into(), value.into());
        }
    }

    for (key, value) in overrides {
        env.insert(key.into(), value.into());
    }

    env
}
