use clap::ArgMatches;
use clap::parser::ValueSource;
use indexmap::IndexMap;

/// Flag values of one invocation, keyed by canonical name (`-` replaced by `_`).
///
/// `all` holds every declared flag with its effective value, `used` only the ones set
/// explicitly on the command line or through the environment. Every key of `used` is in `all`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    all: IndexMap<String, String>,
    used: IndexMap<String, String>,
}

pub fn canonical_flag_name(name: &str) -> String {
    name.replace('-', "_")
}

impl FlagSet {
    /// Materialise the flags of the innermost subcommand matched in `matches`.
    pub fn from_matches(command: &clap::Command, matches: &ArgMatches) -> Self {
        let mut command = command;
        let mut matches = matches;
        while let Some((name, sub_matches)) = matches.subcommand() {
            let Some(sub_command) = command.find_subcommand(name) else {
                break;
            };
            command = sub_command;
            matches = sub_matches;
        }

        let mut flags = Self::default();
        for arg in command.get_arguments() {
            let id = arg.get_id().as_str();
            // Connection options aren't command flags.
            if arg.is_positional() || arg.is_global_set() || id == "help" || id == "version" {
                continue;
            }
            let Ok(Some(raw)) = matches.try_get_raw(id) else {
                continue;
            };
            let value = raw.map(|v| v.to_string_lossy().into_owned()).collect::<Vec<_>>().join(",");
            let explicit = matches!(
                matches.value_source(id),
                Some(ValueSource::CommandLine | ValueSource::EnvVariable)
            );
            if explicit {
                flags.set(id, &value);
            } else {
                flags.set_default(id, &value);
            }
        }
        flags
    }

    /// Record a flag the user didn't set.
    pub fn set_default(&mut self, name: &str, value: &str) -> &mut Self {
        let name = canonical_flag_name(name);
        self.used.shift_remove(&name);
        self.all.insert(name, value.to_owned());
        self
    }

    /// Record a flag the user set explicitly.
    pub fn set(&mut self, name: &str, value: &str) -> &mut Self {
        let name = canonical_flag_name(name);
        self.all.insert(name.clone(), value.to_owned());
        self.used.insert(name, value.to_owned());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.all.get(name).map(String::as_str)
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains_key(name)
    }

    pub fn is_true(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| v == "true")
    }

    /// Drop a flag that a command interprets structurally, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.used.shift_remove(name);
        self.all.shift_remove(name)
    }

    pub fn used(&self) -> impl Iterator<Item = (&str, &str)> {
        self.used.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Comma separated list flag, with blanks dropped.
    pub fn list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}
