//! Baseline permission sets per security level.

use netlaunch_core::SecurityLevel;
use url::Url;

use crate::permission::Permission;

/// Platform properties readable by sandboxed code.
pub const SANDBOX_PROPERTIES: &[&str] = &[
    "os.name",
    "os.arch",
    "os.version",
    "file.separator",
    "path.separator",
    "line.separator",
    "runtime.version",
    "runtime.vendor",
    "runtime.specification.version",
    "browser",
];

/// Sandbox permissions scoped to `origin`.
#[must_use]
pub fn sandbox(origin: &Url) -> Vec<Permission> {
    let mut perms = vec![
        Permission::SocketListen("localhost:1024-".to_owned()),
        Permission::Runtime("stopThread".to_owned()),
    ];
    perms.extend(
        SANDBOX_PROPERTIES
            .iter()
            .map(|p| Permission::PropertyRead((*p).to_owned())),
    );

    if let Some(host) = origin.host_str() {
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host.to_owned()
        };
        perms.push(Permission::SocketConnect(host.clone()));
        perms.push(Permission::SocketAccept(host));
    } else if origin.scheme() == "file"
        && let Ok(path) = origin.to_file_path()
    {
        let dir = if origin.path().ends_with('/') {
            Some(path.as_path())
        } else {
            path.parent()
        };
        if let Some(dir) = dir {
            perms.push(Permission::FileRead(format!(
                "{}/-",
                dir.display().to_string().trim_end_matches('/')
            )));
        }
    }

    perms.push(Permission::UrlAccess(origin_prefix(origin)));
    perms
}

/// Sandbox plus the restricted-elevated additions.
#[must_use]
pub fn restricted(origin: &Url) -> Vec<Permission> {
    let mut perms = sandbox(origin);
    perms.extend([
        Permission::Clipboard,
        Permission::Runtime("exitVM".to_owned()),
        Permission::Runtime("loadLibrary.*".to_owned()),
        Permission::Runtime("queuePrintJob".to_owned()),
        Permission::SocketConnect("*".to_owned()),
        Permission::SocketAccept("localhost:1024-".to_owned()),
        Permission::FileRead("*".to_owned()),
        Permission::FileWrite("*".to_owned()),
        Permission::PropertyRead("*".to_owned()),
    ]);
    perms
}

/// Unrestricted permissions.
#[must_use]
pub fn full() -> Vec<Permission> {
    vec![Permission::All]
}

/// Baseline for `level` scoped to `origin`.
#[must_use]
pub fn for_level(level: SecurityLevel, origin: &Url) -> Vec<Permission> {
    match level {
        SecurityLevel::Sandbox => sandbox(origin),
        SecurityLevel::Restricted => restricted(origin),
        SecurityLevel::Full => full(),
    }
}

/// `scheme://host:port/-` for network origins, `scheme:path/-` otherwise.
#[must_use]
pub fn origin_prefix(origin: &Url) -> String {
    match (origin.host_str(), origin.port_or_known_default()) {
        (Some(host), Some(port)) => format!("{}://{host}:{port}/-", origin.scheme()),
        (Some(host), None) => format!("{}://{host}/-", origin.scheme()),
        (None, _) => {
            let path = origin.path();
            let dir = path.rsplit_once('/').map_or("", |(dir, _)| dir);
            format!("{}://{dir}/-", origin.scheme())
        },
    }
}
