//! Unique block label generation (§4.2 "Block naming").

use hashbrown::HashMap;

/// Produces unique labels from a short tag: `"select_arm"` → `select_arm_0`,
/// `select_arm_1`, … Every lowering pass that needs a family of related
/// blocks (one `BlockNamer` per function) goes through this instead of
/// hand-rolling its own counter.
#[derive(Default)]
pub struct BlockNamer {
    counts: HashMap<&'static str, u32>,
}

impl BlockNamer {
    pub fn new() -> Self {
        BlockNamer { counts: HashMap::new() }
    }

    /// The next unique label for `tag`.
    pub fn name(&mut self, tag: &'static str) -> String {
        let n = self.counts.entry(tag).or_insert(0);
        let label = format!("{tag}_{n}");
        *n += 1;
        label
    }
}

/// A secondary, tag-free mangler used when no [`BlockNamer`] is active but a
/// block still needs *some* non-empty label before the function is
/// finalised (§4.2: "Every block must have a non-empty label before the
/// function is finalised").
#[derive(Default)]
pub struct FallbackMangler {
    next: u32,
}

impl FallbackMangler {
    pub fn new() -> Self {
        FallbackMangler { next: 0 }
    }

    pub fn next_fallback_block_label(&mut self) -> String {
        let label = format!("__bb{}", self.next);
        self.next += 1;
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_get_independent_counters() {
        let mut namer = BlockNamer::new();
        assert_eq!(namer.name("select_arm"), "select_arm_0");
        assert_eq!(namer.name("select_arm"), "select_arm_1");
        assert_eq!(namer.name("select_end"), "select_end_0");
    }

    #[test]
    fn fallback_labels_are_never_repeated() {
        let mut mangler = FallbackMangler::new();
        let a = mangler.next_fallback_block_label();
        let b = mangler.next_fallback_block_label();
        assert_ne!(a, b);
    }
}
