//! Argument and environment construction for the dump utilities.
//!
//! Centralises the per-engine string building so the dispatcher stays
//! focused on orchestration. The postgres password never appears in the
//! argument vector; it travels through the invocation's environment
//! overlay instead.

use std::ffi::OsString;

use crate::control::InstanceEndpoint;

use super::{DumpTarget, Engine};

/// Environment variable `pg_dump` reads the password from.
pub(crate) const PGPASSWORD: &str = "PGPASSWORD";

pub(crate) fn dump_args(
    engine: Engine,
    endpoint: &InstanceEndpoint,
    target: &DumpTarget,
) -> Vec<OsString> {
    match engine {
        Engine::Postgres => vec![
            OsString::from("-w"),
            OsString::from("-Fc"),
            OsString::from("-U"),
            OsString::from(&target.user),
            OsString::from("-h"),
            OsString::from(&endpoint.address),
            OsString::from("-p"),
            OsString::from(endpoint.port.to_string()),
            OsString::from(&target.database),
        ],
        Engine::Mysql => {
            let mut args = vec![
                OsString::from("-u"),
                OsString::from(&target.user),
            ];
            if let Some(password) = &target.password {
                args.push(OsString::from(format!("-p{password}")));
            }
            args.push(OsString::from("-h"));
            args.push(OsString::from(&endpoint.address));
            args.push(OsString::from("-P"));
            args.push(OsString::from(endpoint.port.to_string()));
            args.push(OsString::from(&target.database));
            args
        }
    }
}

pub(crate) fn dump_env(engine: Engine, target: &DumpTarget) -> Vec<(&'static str, String)> {
    match engine {
        Engine::Postgres => target
            .password
            .as_ref()
            .map(|password| vec![(PGPASSWORD, password.clone())])
            .unwrap_or_default(),
        Engine::Mysql => Vec::new(),
    }
}
