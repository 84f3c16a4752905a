//! Generated Ansible inventory
//!
//! One INI-style group per file, one host line carrying the connection
//! parameters as `key=value` pairs. Option names are written exactly as
//! Ansible expects them, no case folding.

use anyhow::{Context, Result};
use bakeflow_config::Connection;
use std::path::Path;

pub const BUILD_GROUP: &str = "build";

pub struct InventoryEntry<'a> {
    pub group: &'a str,
    pub ip: &'a str,
    pub keyfile: &'a Path,
    pub username: &'a str,
    pub password: Option<&'a str>,
    pub port: u16,
    pub connection: Connection,
}

impl InventoryEntry<'_> {
    fn render(&self) -> String {
        let mut line = format!(
            "{} ansible_ssh_private_key_file={} ansible_user={}",
            self.ip,
            self.keyfile.display(),
            self.username,
        );
        if let Some(password) = self.password {
            line.push_str(&format!(" ansible_password={password}"));
        }
        line.push_str(&format!(
            " ansible_port={} ansible_connection={}",
            self.port, self.connection
        ));
        format!("[{}]\n{}\n", self.group, line)
    }
}

/// Write the inventory file with owner-only permissions; it may carry a
/// decrypted password
pub fn write_inventory(path: &Path, entry: &InventoryEntry<'_>) -> Result<()> {
    std::fs::write(path, entry.render())
        .with_context(|| format!("failed to write inventory {}", path.display()))?;
    restrict_permissions(path)?;
    Ok(())
}

#[cfg(unix)]
pub fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
pub fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ssh_entry_renders_without_password() {
        let entry = InventoryEntry {
            group: BUILD_GROUP,
            ip: "20.30.40.50",
            keyfile: Path::new(".bakeflow/centos-default.pem"),
            username: "ec2-user",
            password: None,
            port: 22,
            connection: Connection::Ssh,
        };
        assert_eq!(
            entry.render(),
            "[build]\n20.30.40.50 \
             ansible_ssh_private_key_file=.bakeflow/centos-default.pem \
             ansible_user=ec2-user ansible_port=22 ansible_connection=ssh\n"
        );
    }

    #[test]
    fn winrm_entry_carries_the_decrypted_password() {
        let entry = InventoryEntry {
            group: BUILD_GROUP,
            ip: "10.20.30.40",
            keyfile: Path::new(".bakeflow/win-default.pem"),
            username: "Administrator",
            password: Some("s3cret"),
            port: 5985,
            connection: Connection::Winrm,
        };
        let rendered = entry.render();
        assert!(rendered.contains("ansible_password=s3cret"));
        assert!(rendered.contains("ansible_connection=winrm"));
        assert!(rendered.contains("ansible_port=5985"));
    }

    #[test]
    fn inventory_file_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("centos-default.inventory");
        let entry = InventoryEntry {
            group: BUILD_GROUP,
            ip: "20.30.40.50",
            keyfile: Path::new("key.pem"),
            username: "ec2-user",
            password: None,
            port: 22,
            connection: Connection::Ssh,
        };
        write_inventory(&path, &entry).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
