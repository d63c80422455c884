//! Sample domain fixtures shared by integration tests across crates.

use chrono::{DateTime, Utc};
use qbfleet_core::{Instance, InstanceId};

/// Build a sample `Instance` row with the given id, suitable for seeding a
/// test database or stubbing an `InstanceStore`.
#[must_use]
pub fn sample_instance(id: InstanceId) -> Instance {
    let now: DateTime<Utc> = DateTime::UNIX_EPOCH;
    Instance {
        id,
        name: format!("test-instance-{id}"),
        base_url: format!("http://10.0.0.{id}:8080"),
        username: "admin".to_string(),
        encrypted_password: "ZmFrZS1jaXBoZXJ0ZXh0".to_string(),
        password_nonce: "ZmFrZS1ub25jZQ==".to_string(),
        basic_username: None,
        encrypted_basic_password: None,
        basic_password_nonce: None,
        is_active: true,
        has_local_filesystem_access: false,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_instance_is_active_by_default() {
        let instance = sample_instance(7);
        assert_eq!(instance.id, 7);
        assert!(instance.is_active);
        assert!(instance.base_url.contains("10.0.0.7"));
    }
}
