//! Configuration inputs (spec.md §6: "master address (transport URL),
//! zone name (this client's declared zone)"). Parsing these from the
//! command line with `clap` is `murphyctl`'s concern, not the
//! library's — this struct is the plain value the binary hands in.

/// The proxy's connection and identity configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Transport URL of the policy server ("master" in spec.md's
    /// slave/master vocabulary).
    pub master_addr: String,
    /// This client's declared zone (spec.md GLOSSARY: "the slave holds
    /// one zone; the master may have many").
    pub zone: String,
}

impl Config {
    pub fn new(master_addr: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            master_addr: master_addr.into(),
            zone: zone.into(),
        }
    }
}
