//! Machine configuration.

/// Sizing knobs for a [`crate::Machine`] and its threads.
///
/// Both sizes are fixed for the life of the machine; per-thread nurseries
/// and operand stacks are allocated at thread creation and never grow.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Per-thread nursery size in bytes. An allocation request larger
    /// than this is a fatal error (large-object spaces are a non-goal).
    pub nursery_size: usize,

    /// Per-thread operand-stack depth in reference slots. A call whose
    /// frame would exceed it raises `StackOverflowError`.
    pub stack_size: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            nursery_size: 512 * 1024,
            stack_size: 64 * 1024,
        }
    }
}

impl MachineConfig {
    /// A small configuration for tests that want to provoke collections
    /// quickly.
    pub fn small() -> Self {
        MachineConfig {
            nursery_size: 16 * 1024,
            stack_size: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = MachineConfig::default();
        assert!(c.nursery_size >= 64 * 1024);
        assert!(c.stack_size >= 1024);
        assert!(MachineConfig::small().nursery_size < c.nursery_size);
    }
}
