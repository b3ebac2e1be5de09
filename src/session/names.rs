//! Human-readable session names drawn from a fixed pool.

use std::collections::HashSet;

use tracing::debug;

use crate::error::SessionError;

use super::normalize_id;

/// Random draws attempted before falling back to a linear scan.
const MAX_RANDOM_ATTEMPTS: usize = 16;

const NAME_POOL: [&str; 250] = [
    "acacia", "acorn", "alder", "alpine", "amber", "anchor", "anvil", "apex", "apricot",
    "arbor", "arch", "argon", "arrow", "ash", "aspen", "aster", "atlas", "aurora", "autumn",
    "badger", "balsam", "bamboo", "banyan", "barley", "basalt", "basil", "bay", "bayou",
    "beacon", "beech", "birch", "bison", "blaze", "bluff", "bramble", "breeze", "briar",
    "brook", "buckeye", "butte", "cactus", "caldera", "camel", "canyon", "cardinal", "caribou",
    "cedar", "cellar", "chalk", "cherry", "chestnut", "cinder", "cirrus", "citrus", "clay",
    "clover", "cobalt", "comet", "condor", "copper", "coral", "cormorant", "cosmos", "cove",
    "coyote", "crane", "crater", "creek", "cricket", "crow", "cypress", "dahlia", "delta",
    "dune", "eagle", "echo", "eddy", "egret", "elm", "ember", "ermine", "falcon", "fennel",
    "fern", "ferret", "fig", "finch", "fjord", "flint", "fox", "frost", "gale", "garnet",
    "gecko", "geyser", "ginger", "glacier", "glade", "granite", "gravel", "grove", "gull",
    "harbor", "hare", "hawk", "hazel", "heath", "heron", "hickory", "hollow", "holly",
    "horizon", "hornet", "husky", "ibis", "iris", "ivory", "ivy", "jackal", "jade", "jasper",
    "juniper", "kelp", "kestrel", "kite", "koala", "lagoon", "lantern", "larch", "lark",
    "laurel", "lava", "ledge", "lemon", "lichen", "lilac", "lily", "linden", "lotus", "lupine",
    "lynx", "magnet", "magpie", "mallow", "maple", "marble", "marsh", "marten", "meadow",
    "mesa", "mica", "mink", "mint", "mist", "moose", "moss", "moth", "nectar", "nettle", "newt",
    "nimbus", "nova", "oak", "oasis", "ocelot", "olive", "onyx", "opal", "orca", "orchid",
    "osprey", "otter", "owl", "oyster", "panda", "panther", "pebble", "pelican", "pepper",
    "petrel", "pine", "plover", "plum", "pollen", "poplar", "prairie", "puffin", "quail",
    "quartz", "quince", "rain", "raven", "reed", "reef", "ridge", "river", "robin", "rowan",
    "saffron", "sage", "salmon", "sand", "sequoia", "shale", "shoal", "sierra", "slate",
    "sorrel", "sparrow", "spruce", "squall", "starling", "stone", "storm", "summit", "swallow",
    "swift", "sycamore", "tamarack", "tansy", "tern", "thistle", "thorn", "thrush", "thyme",
    "tide", "tiger", "timber", "topaz", "tulip", "tundra", "vale", "valley", "vapor", "velvet",
    "violet", "viper", "walnut", "wasp", "wattle", "wave", "willow", "wind", "wisteria", "wolf",
    "wren", "yarrow", "yew", "zephyr", "zinc",
];

/// Picks an unused name from the pool.
pub struct NameGenerator {
    pool: &'static [&'static str],
    max_attempts: usize,
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self {
            pool: &NAME_POOL,
            max_attempts: MAX_RANDOM_ATTEMPTS,
        }
    }
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a pool entry not present in `used` (compared case-insensitively).
    ///
    /// Tries a bounded number of uniform random draws, then scans the pool in
    /// order for the first free entry.
    pub fn generate(&self, used: &HashSet<String>) -> Result<String, SessionError> {
        self.generate_with(used, || getrandom::u32().ok())
    }

    fn generate_with(
        &self,
        used: &HashSet<String>,
        mut next_random: impl FnMut() -> Option<u32>,
    ) -> Result<String, SessionError> {
        let used: HashSet<String> = used.iter().map(|n| normalize_id(n)).collect();

        if !self.pool.is_empty() {
            for attempt in 0..self.max_attempts {
                let Some(r) = next_random() else {
                    debug!("names:random source unavailable, scanning pool");
                    break;
                };
                let candidate = self.pool[r as usize % self.pool.len()];
                if !used.contains(candidate) {
                    debug!(name = candidate, attempt, "names:picked random");
                    return Ok(candidate.to_string());
                }
            }
        }

        self.pool
            .iter()
            .find(|candidate| !used.contains(**candidate))
            .map(|candidate| {
                debug!(name = *candidate, "names:picked by scan");
                candidate.to_string()
            })
            .ok_or(SessionError::PoolExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn all_names() -> HashSet<String> {
        NAME_POOL.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pool_has_250_unique_lowercase_names() {
        assert_eq!(all_names().len(), 250);
        assert!(NAME_POOL.iter().all(|n| *n == n.to_lowercase()));
    }

    #[test]
    fn generate_from_empty_used_set() {
        let name = NameGenerator::new().generate(&HashSet::new()).unwrap();
        assert!(NAME_POOL.contains(&name.as_str()));
    }

    #[test]
    fn never_returns_a_used_name() {
        let generator = NameGenerator::new();
        let mut used = HashSet::new();
        // Fill the pool one name at a time; every draw must be fresh.
        for _ in 0..NAME_POOL.len() {
            let name = generator.generate(&used).unwrap();
            assert!(!used.contains(&name), "duplicate name {name}");
            used.insert(name);
        }
        assert_eq!(used.len(), NAME_POOL.len());
    }

    #[test]
    fn exhausted_pool_returns_error() {
        let err = NameGenerator::new().generate(&all_names()).unwrap_err();
        assert!(err.is(ErrorKind::PoolExhausted));
    }

    #[test]
    fn used_names_compare_case_insensitively() {
        let used: HashSet<String> = NAME_POOL
            .iter()
            .skip(1)
            .map(|s| s.to_uppercase())
            .collect();
        let name = NameGenerator::new().generate(&used).unwrap();
        assert_eq!(name, NAME_POOL[0]);
    }

    #[test]
    fn falls_back_to_scan_when_draws_collide() {
        let generator = NameGenerator::new();
        let used: HashSet<String> = [NAME_POOL[0].to_string(), NAME_POOL[1].to_string()].into();
        let mut draws = 0;
        // Always draw index 0, which is taken.
        let name = generator
            .generate_with(&used, || {
                draws += 1;
                Some(0)
            })
            .unwrap();
        assert_eq!(draws, MAX_RANDOM_ATTEMPTS);
        assert_eq!(name, NAME_POOL[2]);
    }

    #[test]
    fn scans_when_random_source_fails() {
        let name = NameGenerator::new()
            .generate_with(&HashSet::new(), || None)
            .unwrap();
        assert_eq!(name, NAME_POOL[0]);
    }
}
