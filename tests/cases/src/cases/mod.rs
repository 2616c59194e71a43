pub mod backend_outage;
pub mod forced_handoff;
pub mod lease_expiry;
pub mod membership;
pub mod mutual_exclusion;
pub mod smoke;

#[cfg(test)]
mod tests {
    #[test]
    fn test_smoke() {
        crate::cases::smoke::run();
    }

    #[test]
    fn test_mutual_exclusion() {
        crate::cases::mutual_exclusion::run();
    }

    #[test]
    fn test_lease_expiry() {
        crate::cases::lease_expiry::run();
    }

    #[test]
    fn test_task_crash() {
        crate::cases::task_crash::run();
    }

    #[test]
    fn test_task_overrun() {
        crate::cases::task_overrun::run();
    }

    #[test]
    fn test_membership() {
        crate::cases::membership::run();
    }

    #[test]
    fn test_leader_resign() {
        crate::cases::leader_resign::run();
    }

    #[test]
    fn test_forced_handoff() {
        crate::cases::forced_handoff::run();
    }

    #[test]
    fn test_backend_outage() {
        crate::cases::backend_outage::run();
    }
}
