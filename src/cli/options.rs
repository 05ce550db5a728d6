//! Option registration and parsing
//!
//! Tools declare their flags on an [`OptionRegistry`]; the registry turns
//! them into a clap [`Command`] together with the options every tool has
//! (`--version`, `-q/--quiet/--cron`, `--debug`, `-v/--verbose`).

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fmt;
use std::str::FromStr;

use clap::builder::PossibleValuesParser;
use clap::error::ErrorKind;
use clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command};
use itertools::Itertools;
use tracing::level_filters::LevelFilter;

/// Destination of the positional arguments.
pub const ARGS_DEST: &str = "args";

const LOG_LEVEL_GROUP: &str = "log_level";
const RESERVED_DESTS: [&str; 7] = [
    ARGS_DEST,
    LOG_LEVEL_GROUP,
    "quiet",
    "debug",
    "verbose",
    "version",
    "help",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Defaults to false, true when present
    Boolean,
    /// Takes exactly one argument
    Value,
}

/// Coercion applied to a value option without `choices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueType {
    #[default]
    Text,
    Integer,
    Float,
}

/// A registered command line option.
#[derive(Debug, Clone)]
pub struct OptionSpec {
    flags: Vec<String>,
    dest: String,
    kind: OptionKind,
    help: String,
    default: Option<String>,
    choices: Option<Vec<String>>,
    metavar: Option<String>,
    value_type: ValueType,
}

impl OptionSpec {
    fn new(flags: &[&str], help: &str, kind: OptionKind) -> Self {
        Self {
            flags: flags.iter().map(|f| f.to_string()).collect(),
            dest: derive_dest(flags),
            kind,
            help: help.to_string(),
            default: None,
            choices: None,
            metavar: None,
            value_type: ValueType::default(),
        }
    }

    /// Store the value under `dest` instead of the derived key.
    pub fn dest(&mut self, dest: &str) -> &mut Self {
        self.dest = dest.to_string();
        self
    }

    /// Value used when the option is absent; a non-empty default is
    /// appended to the help text.
    pub fn default_value(&mut self, default: &str) -> &mut Self {
        self.default = Some(default.to_string());
        self
    }

    /// Restrict the value to a fixed set. Overrides any [`ValueType`].
    pub fn choices(&mut self, choices: &[&str]) -> &mut Self {
        self.choices = Some(choices.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn metavar(&mut self, metavar: &str) -> &mut Self {
        self.metavar = Some(metavar.to_string());
        self
    }

    pub fn value_type(&mut self, value_type: ValueType) -> &mut Self {
        self.value_type = value_type;
        self
    }

    /// Key the parsed value is stored under.
    pub fn key(&self) -> &str {
        &self.dest
    }

    pub fn kind(&self) -> OptionKind {
        self.kind
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// Help text as shown to the user.
    pub fn help_text(&self) -> String {
        match self.default.as_deref() {
            Some(default) if !default.is_empty() => format!("{} [{}]", self.help, default),
            _ => self.help.clone(),
        }
    }

    fn to_arg(&self) -> Arg {
        let mut arg = Arg::new(self.dest.clone()).help(self.help_text());

        let mut longs = self.flags.iter().filter_map(|f| f.strip_prefix("--"));
        if let Some(long) = longs.next() {
            arg = arg.long(long.to_string());
        }
        for alias in longs {
            arg = arg.visible_alias(alias.to_string());
        }

        let mut shorts = self
            .flags
            .iter()
            .filter(|f| !f.starts_with("--"))
            .map(|f| short_flag(f));
        if let Some(short) = shorts.next() {
            arg = arg.short(short);
        }
        for short in shorts {
            arg = arg.visible_short_alias(short);
        }

        match self.kind {
            OptionKind::Boolean => arg.action(ArgAction::SetTrue),
            OptionKind::Value => {
                let metavar = self
                    .metavar
                    .clone()
                    .unwrap_or_else(|| self.dest.to_uppercase());
                arg = arg.action(ArgAction::Set).num_args(1).value_name(metavar);
                if let Some(default) = &self.default {
                    arg = arg.default_value(default.clone()).hide_default_value(true);
                }
                match (&self.choices, self.value_type) {
                    (Some(choices), _) => {
                        arg.value_parser(PossibleValuesParser::new(choices.clone()))
                    }
                    (None, ValueType::Text) => arg,
                    (None, ValueType::Integer) => arg.value_parser(value_parser!(i64)),
                    (None, ValueType::Float) => arg.value_parser(value_parser!(f64)),
                }
            }
        }
    }
}

/// Derive the destination key from the first long flag name.
///
/// # Panics
/// If `flags` has no `--long` name. This is a programming error in the
/// tool, not a user error.
fn derive_dest(flags: &[&str]) -> String {
    let long = flags
        .iter()
        .find(|f| f.starts_with("--") && f.len() > 2)
        .unwrap_or_else(|| panic!("option {:?} needs a --long flag name", flags));
    long.trim_start_matches("--").replace('-', "_")
}

fn short_flag(flag: &str) -> char {
    let mut chars = flag.strip_prefix('-').unwrap_or_default().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '-' => c,
        _ => panic!("invalid flag name {:?}", flag),
    }
}

/// A parsed option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Flag(bool),
    Value(Option<String>),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Flag(flag) => write!(f, "{}", flag),
            OptionValue::Value(Some(value)) => write!(f, "{:?}", value),
            OptionValue::Value(None) => write!(f, "None"),
        }
    }
}

/// Options of one invocation. Read-only once parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    values: BTreeMap<String, OptionValue>,
    args: Vec<String>,
    log_level: Option<LevelFilter>,
}

impl ParsedOptions {
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(key)
    }

    /// Boolean option; false when absent or not a flag.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(OptionValue::Flag(true)))
    }

    /// Value option as given (or its default).
    pub fn value(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(OptionValue::Value(value)) => value.as_deref(),
            _ => None,
        }
    }

    /// Value option converted with `FromStr`; `None` when absent or
    /// not convertible.
    pub fn value_as<T: FromStr>(&self, key: &str) -> Option<T> {
        self.value(key).and_then(|v| v.parse().ok())
    }

    /// Positional arguments, in order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Threshold selected by `--quiet`, `--debug` or `--verbose`.
    pub fn log_level(&self) -> Option<LevelFilter> {
        self.log_level
    }
}

impl fmt::Display for ParsedOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let log_level = self
            .log_level
            .and_then(|l| l.into_level())
            .map(|l| l.to_string())
            .unwrap_or_else(|| "None".to_string());
        let entries = self
            .values
            .iter()
            .map(|(key, value)| (key.as_str(), value.to_string()))
            .chain([
                (ARGS_DEST, format!("{:?}", self.args)),
                (LOG_LEVEL_GROUP, log_level),
            ])
            .sorted_by(|a, b| a.0.cmp(b.0))
            .map(|(key, value)| format!("{}={}", key, value))
            .join(", ");
        write!(f, "{}", entries)
    }
}

/// Result of [`OptionRegistry::parse`].
#[derive(Debug)]
pub enum ParseOutcome {
    Parsed(ParsedOptions),
    /// `--version` was given; print the text and stop.
    Version(String),
    /// Help output or a usage error; print it and exit with its code.
    ParserExit(clap::Error),
}

/// Declarative builder for a tool's command line.
#[derive(Debug, Clone)]
pub struct OptionRegistry {
    name: String,
    version: String,
    args_help: String,
    copyright: String,
    description: String,
    additional_help: Vec<String>,
    specs: Vec<OptionSpec>,
}

impl OptionRegistry {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            args_help: String::new(),
            copyright: String::new(),
            description: String::new(),
            additional_help: Vec::new(),
            specs: Vec::new(),
        }
    }

    /// Positional argument synopsis for the usage line.
    pub fn args_help(mut self, args_help: &str) -> Self {
        self.args_help = args_help.to_string();
        self
    }

    pub fn copyright(mut self, copyright: &str) -> Self {
        self.copyright = copyright.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Extra lines shown after the option list.
    pub fn additional_help(mut self, lines: &[&str]) -> Self {
        self.additional_help = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Register a flag that defaults to false.
    ///
    /// # Panics
    /// If `flags` has no `--long` name.
    pub fn add_boolean(&mut self, flags: &[&str], help: &str) -> &mut OptionSpec {
        self.push(OptionSpec::new(flags, help, OptionKind::Boolean))
    }

    /// Register an option taking one value.
    ///
    /// # Panics
    /// If `flags` has no `--long` name.
    pub fn add_value(&mut self, flags: &[&str], help: &str) -> &mut OptionSpec {
        self.push(OptionSpec::new(flags, help, OptionKind::Value))
    }

    pub fn specs(&self) -> &[OptionSpec] {
        &self.specs
    }

    fn push(&mut self, spec: OptionSpec) -> &mut OptionSpec {
        let index = self.specs.len();
        self.specs.push(spec);
        &mut self.specs[index]
    }

    /// Text printed for `--version`.
    pub fn version_text(&self) -> String {
        let mut text = format!("{} {}", self.name, self.version);
        if !self.copyright.is_empty() {
            text.push('\n');
            text.push_str(&self.copyright);
        }
        if !self.description.is_empty() {
            text.push_str("\n\n");
            text.push_str(self.description.trim());
        }
        text
    }

    /// Build the clap command.
    ///
    /// # Panics
    /// If two options share a destination key, or one uses a reserved key.
    pub fn command(&self, intermixed: bool) -> Command {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for spec in &self.specs {
            assert!(
                !RESERVED_DESTS.contains(&spec.dest.as_str()) && seen.insert(spec.dest.as_str()),
                "duplicate option destination {:?}",
                spec.dest
            );
        }

        let mut command = Command::new(self.name.clone())
            .version(self.version.clone())
            .override_usage(format!("{} [options] {}", self.name, self.args_help))
            .about(self.version_text())
            .disable_version_flag(true)
            .arg(
                Arg::new("version")
                    .long("version")
                    .action(ArgAction::Version)
                    .help("Show program's version number and exit"),
            )
            .arg(
                Arg::new("quiet")
                    .short('q')
                    .long("quiet")
                    .visible_alias("cron")
                    .action(ArgAction::SetTrue)
                    .help("Silence warnings"),
            )
            .arg(
                Arg::new("debug")
                    .long("debug")
                    .action(ArgAction::SetTrue)
                    .help("Show detailed messages"),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .action(ArgAction::SetTrue)
                    .help("Show additional information"),
            )
            .group(
                ArgGroup::new(LOG_LEVEL_GROUP)
                    .args(["quiet", "debug", "verbose"])
                    .multiple(false),
            );
        if !self.additional_help.is_empty() {
            command = command.after_help(self.additional_help.join("\n"));
        }
        for spec in &self.specs {
            command = command.arg(spec.to_arg());
        }

        let mut args = Arg::new(ARGS_DEST)
            .num_args(0..)
            .action(ArgAction::Append)
            .value_name("ARGS");
        if !intermixed {
            args = args.trailing_var_arg(true);
        }
        command.arg(args)
    }

    /// Parse `argv` (program name first).
    ///
    /// With `intermixed`, positional arguments and options may be freely
    /// interleaved; otherwise everything from the first positional on is
    /// positional.
    pub fn parse<I, T>(&self, argv: I, intermixed: bool) -> ParseOutcome
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match self.command(intermixed).try_get_matches_from(argv) {
            Ok(matches) => ParseOutcome::Parsed(self.collect(&matches)),
            Err(e) if e.kind() == ErrorKind::DisplayVersion => {
                ParseOutcome::Version(self.version_text())
            }
            Err(e) => ParseOutcome::ParserExit(e),
        }
    }

    fn collect(&self, matches: &ArgMatches) -> ParsedOptions {
        let values = self
            .specs
            .iter()
            .map(|spec| {
                let value = match spec.kind {
                    OptionKind::Boolean => OptionValue::Flag(matches.get_flag(&spec.dest)),
                    OptionKind::Value => OptionValue::Value(
                        matches
                            .get_raw(&spec.dest)
                            .and_then(|mut raw| raw.next())
                            .map(|v| v.to_string_lossy().into_owned()),
                    ),
                };
                (spec.dest.clone(), value)
            })
            .collect();

        let args = matches
            .get_raw(ARGS_DEST)
            .map(|raw| raw.map(|v| v.to_string_lossy().into_owned()).collect())
            .unwrap_or_default();

        let log_level = if matches.get_flag("quiet") {
            Some(LevelFilter::ERROR)
        } else if matches.get_flag("debug") {
            Some(LevelFilter::DEBUG)
        } else if matches.get_flag("verbose") {
            Some(LevelFilter::INFO)
        } else {
            None
        };

        ParsedOptions {
            values,
            args,
            log_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn registry() -> OptionRegistry {
        let mut registry = OptionRegistry::new("rtsample", "1.0 on linux")
            .args_help("<item>...")
            .copyright("Copyright (c) the sample authors")
            .description("Sample tool.");
        registry.add_boolean(&["-n", "--dry-run"], "don't change anything");
        registry
            .add_value(&["-o", "--output-format"], "output format")
            .default_value("plain")
            .choices(&["plain", "json"]);
        registry
            .add_value(&["--max-items"], "stop after N items")
            .metavar("N")
            .value_type(ValueType::Integer);
        registry
            .add_value(&["-U", "--url"], "daemon URL")
            .dest("scgi_url");
        registry
    }

    fn parsed(argv: &[&str], intermixed: bool) -> ParsedOptions {
        match registry().parse(argv, intermixed) {
            ParseOutcome::Parsed(options) => options,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn verify_command() {
        registry().command(false).debug_assert();
        registry().command(true).debug_assert();
    }

    #[test]
    fn given_flags_when_registered_then_dest_derived_from_first_long_name() {
        let registry = registry();
        let keys: Vec<_> = registry.specs().iter().map(|s| s.key()).collect();
        assert_eq!(keys, vec!["dry_run", "output_format", "max_items", "scgi_url"]);
    }

    #[test]
    #[should_panic(expected = "needs a --long flag name")]
    fn given_short_flags_only_when_registered_then_panics() {
        let mut registry = OptionRegistry::new("rtsample", "1.0");
        registry.add_boolean(&["-x"], "no long name");
    }

    #[test]
    #[should_panic(expected = "duplicate option destination")]
    fn given_duplicate_dest_when_command_built_then_panics() {
        let mut registry = OptionRegistry::new("rtsample", "1.0");
        registry.add_boolean(&["--force"], "force");
        registry.add_boolean(&["--force-all"], "force all").dest("force");
        registry.command(false);
    }

    #[test]
    fn given_truthy_default_when_help_text_then_default_appended() {
        let registry = registry();
        assert_eq!(registry.specs()[1].help_text(), "output format [plain]");
        assert_eq!(registry.specs()[2].help_text(), "stop after N items");
    }

    #[test]
    fn given_no_options_when_parsed_then_defaults_apply() {
        let options = parsed(&["rtsample"], false);
        assert!(!options.flag("dry_run"));
        assert_eq!(options.value("output_format"), Some("plain"));
        assert_eq!(options.value("max_items"), None);
        assert!(options.args().is_empty());
        assert_eq!(options.log_level(), None);
    }

    #[test]
    fn given_values_when_parsed_then_stored_under_dest() {
        let options = parsed(
            &["rtsample", "-n", "--max-items", "5", "-U", "home", "a", "b"],
            false,
        );
        assert!(options.flag("dry_run"));
        assert_eq!(options.value_as::<i64>("max_items"), Some(5));
        assert_eq!(options.value("scgi_url"), Some("home"));
        assert_eq!(options.args(), ["a", "b"]);
    }

    #[test]
    fn given_bad_choice_when_parsed_then_parser_exit_with_usage_code() {
        match registry().parse(["rtsample", "-o", "xml"], false) {
            ParseOutcome::ParserExit(e) => {
                assert_eq!(e.kind(), ErrorKind::InvalidValue);
                assert_eq!(e.exit_code(), crate::exitcode::USAGE);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn given_non_integer_when_parsed_then_parser_exit() {
        assert!(matches!(
            registry().parse(["rtsample", "--max-items", "many"], false),
            ParseOutcome::ParserExit(_)
        ));
    }

    #[rstest]
    #[case("-q", LevelFilter::ERROR)]
    #[case("--quiet", LevelFilter::ERROR)]
    #[case("--cron", LevelFilter::ERROR)]
    #[case("--debug", LevelFilter::DEBUG)]
    #[case("-v", LevelFilter::INFO)]
    #[case("--verbose", LevelFilter::INFO)]
    fn given_logging_flag_when_parsed_then_level_resolved(
        #[case] flag: &str,
        #[case] expected: LevelFilter,
    ) {
        assert_eq!(parsed(&["rtsample", flag], false).log_level(), Some(expected));
    }

    #[test]
    fn given_two_logging_flags_when_parsed_then_conflict() {
        match registry().parse(["rtsample", "-q", "--debug"], false) {
            ParseOutcome::ParserExit(e) => assert_eq!(e.kind(), ErrorKind::ArgumentConflict),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn given_version_flag_when_parsed_then_version_outcome() {
        match registry().parse(["rtsample", "--version"], false) {
            ParseOutcome::Version(text) => {
                assert!(text.starts_with("rtsample 1.0 on linux"));
                assert!(text.contains("Copyright (c) the sample authors"));
                assert!(text.contains("Sample tool."));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn given_option_after_positional_when_not_intermixed_then_kept_positional() {
        let options = parsed(&["rtsample", "a", "-n", "b"], false);
        assert!(!options.flag("dry_run"));
        assert_eq!(options.args(), ["a", "-n", "b"]);
    }

    #[test]
    fn given_option_after_positional_when_intermixed_then_parsed_as_option() {
        let options = parsed(&["rtsample", "a", "-n", "b"], true);
        assert!(options.flag("dry_run"));
        assert_eq!(options.args(), ["a", "b"]);
    }

    #[test]
    fn given_parsed_options_when_displayed_then_sorted_key_value_pairs() {
        let options = parsed(&["rtsample", "--debug", "x"], false);
        assert_eq!(
            options.to_string(),
            "args=[\"x\"], dry_run=false, log_level=DEBUG, max_items=None, \
             output_format=\"plain\", scgi_url=None"
        );
    }
}
