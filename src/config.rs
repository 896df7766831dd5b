use std::{
    collections::{BTreeMap, HashMap},
    env, fs,
    path::PathBuf,
    time::Duration,
};

use color_eyre::{
    Result,
    eyre::{Context, ContextCompat, eyre},
};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    style::{Attribute, Attributes, Color, ContentStyle},
};
use directories::ProjectDirs;
use itertools::Itertools;
use serde::{
    Deserialize,
    de::{Deserializer, Error},
};

use crate::model::{SortDirection, SortField};

/// Main configuration struct for the application
#[derive(Clone, Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
#[cfg_attr(not(test), serde(default))]
pub struct Config {
    /// Directory where the data must be stored
    pub data_dir: PathBuf,
    /// Whether to disable every color and text attribute
    pub no_color: bool,
    /// Hard ceiling on the number of records loaded in a single list
    pub max_records: usize,
    /// Number of queries kept in the history ring
    pub history_size: usize,
    /// Ordered columns displayed on each row
    pub columns: Vec<Column>,
    /// Scoring weights for each match class
    pub weights: Weights,
    /// Default sort of the record list
    pub sort: SortConfig,
    /// Configuration for the on-disk cache
    pub cache: CacheConfig,
    /// Configuration for the background refresh of cache entries
    pub refresh: RefreshConfig,
    /// Configuration for the resource provider
    pub provider: ProviderConfig,
    /// Configuration settings for application logging
    pub logs: LogsConfig,
    /// Configuration for the key bindings used within the TUI
    pub keybindings: KeyBindingsConfig,
    /// Configuration for the visual theme of the TUI
    pub theme: Theme,
}

/// A column of the record list
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Column {
    Name,
    Id,
    PrivateIp,
    State,
    Type,
    Az,
}

impl Column {
    /// Fixed width of the column, in terminal cells
    pub fn width(&self) -> usize {
        match self {
            Column::Name => 30,
            Column::Id => 19,
            Column::PrivateIp => 15,
            Column::State => 13,
            Column::Type => 12,
            Column::Az => 15,
        }
    }

    /// Header label of the column
    pub fn header(&self) -> &'static str {
        match self {
            Column::Name => "NAME",
            Column::Id => "ID",
            Column::PrivateIp => "PRIVATE IP",
            Column::State => "STATE",
            Column::Type => "TYPE",
            Column::Az => "AZ",
        }
    }
}

/// Positive weights of each match class when scoring a record
#[derive(Clone, Copy, Debug, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[cfg_attr(not(test), serde(default))]
pub struct Weights {
    pub name: u32,
    pub id: u32,
    pub tags: u32,
    pub ip: u32,
    pub dns: u32,
}

/// Default sort of the record list
#[derive(Clone, Copy, Default, Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
#[cfg_attr(not(test), serde(default))]
pub struct SortConfig {
    pub field: SortField,
    pub direction: SortDirection,
}

/// Configuration for the on-disk cache
#[derive(Clone, Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
#[cfg_attr(not(test), serde(default))]
pub struct CacheConfig {
    /// Whether listings are cached at all
    pub enabled: bool,
    /// Time an entry is served past the stale threshold before it expires
    #[serde(deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
    /// Directory of the cache, defaults to `<data_dir>/cache`
    pub dir: PathBuf,
    /// Size ceiling of a single entry, in bytes
    pub max_file_size: u64,
}

/// Configuration for the background refresh of cache entries
#[derive(Clone, Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
#[cfg_attr(not(test), serde(default))]
pub struct RefreshConfig {
    /// Number of refresh workers
    pub workers: usize,
    /// Capacity of the refresh request queue
    pub queue_size: usize,
    /// Age after which a fresh entry is refreshed in the background
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    /// Age after which an entry is considered stale
    #[serde(deserialize_with = "deserialize_duration")]
    pub stale_threshold: Duration,
    /// Timeout of each background refresh
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

/// Configuration for the resource provider
#[derive(Clone, Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
#[cfg_attr(not(test), serde(default))]
pub struct ProviderConfig {
    /// External command listing and describing resources
    pub command: String,
    /// Region to query, falls back to the `FLEET_SELECT_REGION` env variable
    pub region: String,
    /// Known regions, displayed by the `regions` command
    pub regions: Vec<String>,
    /// Timeout of each provider call
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Maximum number of concurrent describe calls when enriching a listing
    pub concurrency: usize,
}

/// Configuration settings for application logging
#[derive(Clone, Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
#[cfg_attr(not(test), serde(default))]
pub struct LogsConfig {
    /// Whether application logging is enabled
    pub enabled: bool,
    /// The log filter to apply, controlling which logs are recorded.
    ///
    /// This string supports the `tracing-subscriber`'s environment filter syntax.
    pub filter: String,
}

/// Configuration for the key bindings used in the selector.
///
/// Every action can be bound to one or more key events.
#[derive(Clone, Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
#[cfg_attr(not(test), serde(default))]
pub struct KeyBindingsConfig(
    #[serde(deserialize_with = "deserialize_bindings_with_defaults")] BTreeMap<KeyBindingAction, KeyBinding>,
);

/// Actions of the selector that can be configured with specific key bindings
#[derive(Copy, Clone, Deserialize, PartialOrd, PartialEq, Eq, Ord, Debug)]
#[cfg_attr(test, derive(strum::EnumIter))]
#[serde(rename_all = "snake_case")]
pub enum KeyBindingAction {
    /// Cancel the selection
    Quit,
    /// Accept the current selection
    Confirm,
    /// Mark or unmark the highlighted record
    Mark,
    /// Cycle the sort field
    SortField,
    /// Toggle the sort direction
    SortDirection,
    /// Cycle the preview pane between details, json and help
    PreviewMode,
    /// Reload the list through the cache
    Reload,
    /// Recall the previous query from the history
    HistoryPrev,
    /// Recall the next query from the history
    HistoryNext,
}

/// A single logical key binding that can be triggered by one or more physical `KeyEvent`s
#[derive(Clone, Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct KeyBinding(#[serde(deserialize_with = "deserialize_key_events")] Vec<KeyEvent>);

/// TUI theme configuration.
///
/// Defines the colors, styles, and highlighting behavior for both the selector and the plain text output.
#[derive(Clone, Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
#[cfg_attr(not(test), serde(default))]
pub struct Theme {
    /// To be used as the primary style, like for names
    #[serde(deserialize_with = "deserialize_style")]
    pub primary: ContentStyle,
    /// To be used as the secondary style, like for identifiers or less important text
    #[serde(deserialize_with = "deserialize_style")]
    pub secondary: ContentStyle,
    /// Accent style, for section titles and labels
    #[serde(deserialize_with = "deserialize_style")]
    pub accent: ContentStyle,
    /// Style for hints and footers
    #[serde(deserialize_with = "deserialize_style")]
    pub comment: ContentStyle,
    /// Style for errors
    #[serde(deserialize_with = "deserialize_style")]
    pub error: ContentStyle,
    /// Optional background color for the highlighted row
    #[serde(deserialize_with = "deserialize_color")]
    pub highlight: Option<Color>,
    /// The symbol displayed next to the highlighted row
    pub highlight_symbol: String,
    /// Primary style applied when a row is highlighted
    #[serde(deserialize_with = "deserialize_style")]
    pub highlight_primary: ContentStyle,
    /// Secondary style applied when a row is highlighted
    #[serde(deserialize_with = "deserialize_style")]
    pub highlight_secondary: ContentStyle,
    /// Accent style applied when a row is highlighted
    #[serde(deserialize_with = "deserialize_style")]
    pub highlight_accent: ContentStyle,
    /// Comments style applied when a row is highlighted
    #[serde(deserialize_with = "deserialize_style")]
    pub highlight_comment: ContentStyle,
    /// Style for healthy status tokens (running, active)
    #[serde(deserialize_with = "deserialize_style")]
    pub ok: ContentStyle,
    /// Style for transitional status tokens (pending, updating) and warnings
    #[serde(deserialize_with = "deserialize_style")]
    pub warn: ContentStyle,
    /// Style for failed or stopped status tokens
    #[serde(deserialize_with = "deserialize_style")]
    pub bad: ContentStyle,
    /// Style for the spans matching a search term
    #[serde(deserialize_with = "deserialize_style")]
    pub matched: ContentStyle,
    /// Style for headers
    #[serde(deserialize_with = "deserialize_style")]
    pub header: ContentStyle,
}

impl Config {
    /// Initializes the application configuration.
    ///
    /// Attempts to load the configuration from the user's config directory (`config.toml`). If the file does not exist
    /// or has missing fields, it falls back to default values.
    pub fn init(config_file: Option<PathBuf>) -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("org", "FleetSelect", "fleet-select").wrap_err("Couldn't initialize project directory")?;

        let config_path = config_file.unwrap_or_else(|| proj_dirs.config_dir().join("config.toml"));
        let mut config = if config_path.exists() {
            let config_str = fs::read_to_string(&config_path)
                .wrap_err_with(|| format!("Couldn't read config file {}", config_path.display()))?;
            toml::from_str(&config_str)
                .wrap_err_with(|| format!("Couldn't parse config file {}", config_path.display()))?
        } else {
            Config::default()
        };
        if config.data_dir.as_os_str().is_empty() {
            config.data_dir = proj_dirs.data_dir().to_path_buf();
        }
        if config.cache.dir.as_os_str().is_empty() {
            config.cache.dir = config.data_dir.join("cache");
        }
        if config.provider.region.is_empty() {
            config.provider.region = env::var("FLEET_SELECT_REGION").unwrap_or_default();
        }
        if env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            config.no_color = true;
        }
        if config.no_color {
            config.theme = Theme::plain();
        }

        let problems = config.validate();
        if !problems.is_empty() {
            return Err(eyre!(
                "Couldn't parse config file {}\n\n{}",
                config_path.display(),
                problems.into_iter().map(|p| format!("- {p}")).join("\n")
            ));
        }

        fs::create_dir_all(&config.data_dir)
            .wrap_err_with(|| format!("Couldn't create data dir {}", config.data_dir.display()))?;

        Ok(config)
    }

    /// Path of the configuration file used when none is provided
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "FleetSelect", "fleet-select").map(|d| d.config_dir().join("config.toml"))
    }

    /// Checks the cross-field constraints, returning every problem found
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let conflicts = self.keybindings.find_conflicts();
        if !conflicts.is_empty() {
            problems.push(format!(
                "There are some key binding conflicts: {}",
                conflicts
                    .into_iter()
                    .map(|(_, a)| a.into_iter().map(|a| format!("{a:?}")).join(" / "))
                    .join(", ")
            ));
        }
        if self.columns.is_empty() {
            problems.push(String::from("at least one column must be displayed"));
        }
        let Weights { name, id, tags, ip, dns } = self.weights;
        if [name, id, tags, ip, dns].contains(&0) {
            problems.push(String::from("weights must be positive integers"));
        }
        if self.max_records == 0 {
            problems.push(String::from("max_records must be positive"));
        }
        if self.history_size == 0 {
            problems.push(String::from("history_size must be positive"));
        }
        if self.refresh.workers == 0 || self.refresh.queue_size == 0 {
            problems.push(String::from("refresh.workers and refresh.queue_size must be positive"));
        }
        if self.refresh.interval >= self.refresh.stale_threshold {
            problems.push(String::from("refresh.interval must be lower than refresh.stale_threshold"));
        }
        if self.cache.ttl.is_zero() {
            problems.push(String::from("cache.ttl must be positive"));
        }
        if self.provider.concurrency == 0 {
            problems.push(String::from("provider.concurrency must be positive"));
        }
        problems
    }
}

impl KeyBindingsConfig {
    /// Retrieves the [KeyBinding] for a specific action
    pub fn get(&self, action: &KeyBindingAction) -> Option<&KeyBinding> {
        self.0.get(action)
    }

    /// Finds the [KeyBindingAction] associated with the given [KeyEvent], if any
    pub fn get_action_matching(&self, event: &KeyEvent) -> Option<KeyBindingAction> {
        self.0
            .iter()
            .find_map(|(action, binding)| binding.matches(event).then_some(*action))
    }

    /// Finds all ambiguous key bindings where a single `KeyEvent` maps to multiple `KeyBindingAction`s
    pub fn find_conflicts(&self) -> Vec<(KeyEvent, Vec<KeyBindingAction>)> {
        let mut event_to_actions: HashMap<KeyEvent, Vec<KeyBindingAction>> = HashMap::new();
        for (action, binding) in self.0.iter() {
            for event in binding.0.iter() {
                event_to_actions.entry(*event).or_default().push(*action);
            }
        }
        event_to_actions
            .into_iter()
            .filter(|(_, actions)| actions.len() > 1)
            .collect()
    }
}

impl KeyBinding {
    /// Checks if a given `KeyEvent` matches any of the key events configured for this key binding, considering only the
    /// key `code` and its `modifiers`.
    pub fn matches(&self, event: &KeyEvent) -> bool {
        self.0
            .iter()
            .any(|e| e.code == event.code && e.modifiers == event.modifiers)
    }

    /// Human readable label of the first key event, for the help card
    pub fn label(&self) -> String {
        self.0.first().map(key_event_label).unwrap_or_default()
    }
}

fn key_event_label(event: &KeyEvent) -> String {
    let mut label = String::new();
    if event.modifiers.contains(KeyModifiers::CONTROL) {
        label.push_str("ctrl-");
    }
    if event.modifiers.contains(KeyModifiers::ALT) {
        label.push_str("alt-");
    }
    match event.code {
        KeyCode::Char(' ') => label.push_str("space"),
        KeyCode::Char(c) => label.push(c),
        KeyCode::F(n) => label.push_str(&format!("f{n}")),
        code => label.push_str(&code.to_string().to_lowercase()),
    }
    label
}

impl Theme {
    /// A theme without any color or attribute
    pub fn plain() -> Self {
        let none = ContentStyle::new();
        Self {
            primary: none,
            secondary: none,
            accent: none,
            comment: none,
            error: none,
            highlight: None,
            highlight_symbol: String::from("> "),
            highlight_primary: none,
            highlight_secondary: none,
            highlight_accent: none,
            highlight_comment: none,
            ok: none,
            warn: none,
            bad: none,
            matched: none,
            header: none,
        }
    }

    /// Applies the highlight background to the given style, if any
    pub fn with_highlight(&self, style: ContentStyle) -> ContentStyle {
        let mut ret = style;
        if let Some(color) = self.highlight {
            ret.background_color = Some(color);
        }
        ret
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            no_color: false,
            max_records: 5000,
            history_size: 50,
            columns: vec![
                Column::Name,
                Column::Id,
                Column::PrivateIp,
                Column::State,
                Column::Type,
                Column::Az,
            ],
            weights: Weights::default(),
            sort: SortConfig::default(),
            cache: CacheConfig::default(),
            refresh: RefreshConfig::default(),
            provider: ProviderConfig::default(),
            logs: LogsConfig::default(),
            keybindings: KeyBindingsConfig::default(),
            theme: Theme::default(),
        }
    }
}
impl Default for Weights {
    fn default() -> Self {
        Self {
            name: 5,
            id: 4,
            tags: 3,
            ip: 2,
            dns: 1,
        }
    }
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(5 * 60),
            dir: PathBuf::new(),
            max_file_size: 10 * 1024 * 1024,
        }
    }
}
impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_size: 100,
            interval: Duration::from_secs(4 * 60),
            stale_threshold: Duration::from_secs(6 * 60),
            timeout: Duration::from_secs(30),
        }
    }
}
impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            region: String::new(),
            regions: Vec::new(),
            timeout: Duration::from_secs(30),
            concurrency: 6,
        }
    }
}
impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filter: String::from("info"),
        }
    }
}
impl Default for KeyBindingsConfig {
    fn default() -> Self {
        Self(BTreeMap::from([
            (KeyBindingAction::Quit, KeyBinding(vec![KeyEvent::from(KeyCode::Esc)])),
            (KeyBindingAction::Confirm, KeyBinding(vec![KeyEvent::from(KeyCode::Enter)])),
            (
                KeyBindingAction::Mark,
                KeyBinding(vec![
                    KeyEvent::from(KeyCode::Tab),
                    KeyEvent::new(KeyCode::Char(' '), KeyModifiers::CONTROL),
                ]),
            ),
            (
                KeyBindingAction::SortField,
                KeyBinding(vec![KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL)]),
            ),
            (
                KeyBindingAction::SortDirection,
                KeyBinding(vec![KeyEvent::new(KeyCode::Char('o'), KeyModifiers::CONTROL)]),
            ),
            (
                KeyBindingAction::PreviewMode,
                KeyBinding(vec![
                    KeyEvent::new(KeyCode::Char('t'), KeyModifiers::CONTROL),
                    KeyEvent::from(KeyCode::F(2)),
                ]),
            ),
            (
                KeyBindingAction::Reload,
                KeyBinding(vec![
                    KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL),
                    KeyEvent::from(KeyCode::F(5)),
                ]),
            ),
            (
                KeyBindingAction::HistoryPrev,
                KeyBinding(vec![KeyEvent::new(KeyCode::Up, KeyModifiers::ALT)]),
            ),
            (
                KeyBindingAction::HistoryNext,
                KeyBinding(vec![KeyEvent::new(KeyCode::Down, KeyModifiers::ALT)]),
            ),
        ]))
    }
}
impl Default for Theme {
    fn default() -> Self {
        let primary = ContentStyle::new();

        let mut secondary = ContentStyle::new();
        secondary.attributes.set(Attribute::Dim);

        let mut accent = ContentStyle::new();
        accent.foreground_color = Some(Color::Yellow);

        let mut comment = ContentStyle::new();
        comment.foreground_color = Some(Color::Green);
        comment.attributes.set(Attribute::Italic);

        let mut error = ContentStyle::new();
        error.foreground_color = Some(Color::DarkRed);

        let fg = |color: Color| {
            let mut style = ContentStyle::new();
            style.foreground_color = Some(color);
            style
        };

        let mut header = ContentStyle::new();
        header.attributes.set(Attribute::Bold);

        Self {
            primary,
            secondary,
            accent,
            comment,
            error,
            highlight: Some(Color::DarkGrey),
            highlight_symbol: String::from("» "),
            highlight_primary: primary,
            highlight_secondary: ContentStyle::new(),
            highlight_accent: accent,
            highlight_comment: comment,
            ok: fg(Color::Green),
            warn: fg(Color::Yellow),
            bad: fg(Color::Red),
            matched: fg(Color::Cyan),
            header,
        }
    }
}

/// Custom deserialization function for the key bindings.
///
/// Behavior depends on whether compiled for test or not:
/// - In test (`#[cfg(test)]`): Requires all `KeyBindingAction` variants to be present; otherwise, errors. No merging.
/// - In non-test (`#[cfg(not(test))]`): Merges user-provided bindings with defaults.
fn deserialize_bindings_with_defaults<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<KeyBindingAction, KeyBinding>, D::Error>
where
    D: Deserializer<'de>,
{
    let user_provided_bindings = BTreeMap::<KeyBindingAction, KeyBinding>::deserialize(deserializer)?;

    #[cfg(test)]
    {
        use strum::IntoEnumIterator;
        for action_variant in KeyBindingAction::iter() {
            if !user_provided_bindings.contains_key(&action_variant) {
                return Err(D::Error::custom(format!(
                    "Missing key binding for action '{action_variant:?}'."
                )));
            }
        }
        Ok(user_provided_bindings)
    }
    #[cfg(not(test))]
    {
        let mut final_bindings = user_provided_bindings;
        for (action, default_binding) in KeyBindingsConfig::default().0 {
            final_bindings.entry(action).or_insert(default_binding);
        }
        Ok(final_bindings)
    }
}

/// Deserializes a string or a vector of strings into a `Vec<KeyEvent>`
fn deserialize_key_events<'de, D>(deserializer: D) -> Result<Vec<KeyEvent>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        Single(String),
        Multiple(Vec<String>),
    }

    let strings = match StringOrVec::deserialize(deserializer)? {
        StringOrVec::Single(s) => vec![s],
        StringOrVec::Multiple(v) => v,
    };

    strings
        .iter()
        .map(String::as_str)
        .map(parse_key_event)
        .map(|r| r.map_err(D::Error::custom))
        .collect()
}

/// Deserializes either a duration string (`250ms`, `30s`, `5m`, `1h`) or a bare number of seconds
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SecsOrText {
        Secs(u64),
        Text(String),
    }

    match SecsOrText::deserialize(deserializer)? {
        SecsOrText::Secs(secs) => Ok(Duration::from_secs(secs)),
        SecsOrText::Text(text) => parse_duration(&text).map_err(D::Error::custom),
    }
}

/// Deserializes a string into an optional [`Color`]
fn deserialize_color<'de, D>(deserializer: D) -> Result<Option<Color>, D::Error>
where
    D: Deserializer<'de>,
{
    parse_color(&String::deserialize(deserializer)?).map_err(D::Error::custom)
}

/// Deserializes a string into a [`ContentStyle`]
fn deserialize_style<'de, D>(deserializer: D) -> Result<ContentStyle, D::Error>
where
    D: Deserializer<'de>,
{
    parse_style(&String::deserialize(deserializer)?).map_err(D::Error::custom)
}

/// Parses a duration with an optional unit suffix
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    // A zero seconds multiplier means milliseconds
    let (number, unit_secs) = if let Some(n) = raw.strip_suffix("ms") {
        (n, 0)
    } else if let Some(n) = raw.strip_suffix('s') {
        (n, 1)
    } else if let Some(n) = raw.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = raw.strip_suffix('h') {
        (n, 3600)
    } else {
        (raw, 1)
    };
    let value = number
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("Unable to parse duration: {raw}"))?;
    if unit_secs == 0 {
        return Ok(Duration::from_millis(value));
    }
    value
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Duration is too large: {raw}"))
}

/// Parses a string representation of a key event into a [`KeyEvent`].
///
/// Supports modifiers like `ctrl-`, `alt-`, `shift-` and standard key names/characters.
fn parse_key_event(raw: &str) -> Result<KeyEvent, String> {
    let raw_lower = raw.to_ascii_lowercase();
    let mut modifiers = KeyModifiers::empty();
    let mut current = raw_lower.as_str();
    loop {
        if let Some(rest) = current.strip_prefix("ctrl-").or_else(|| current.strip_prefix("ctrl+")) {
            modifiers.insert(KeyModifiers::CONTROL);
            current = rest;
        } else if let Some(rest) = current.strip_prefix("shift-").or_else(|| current.strip_prefix("shift+")) {
            modifiers.insert(KeyModifiers::SHIFT);
            current = rest;
        } else if let Some(rest) = current.strip_prefix("alt-").or_else(|| current.strip_prefix("alt+")) {
            modifiers.insert(KeyModifiers::ALT);
            current = rest;
        } else {
            break;
        }
    }

    let code = match current {
        "esc" => KeyCode::Esc,
        "enter" => KeyCode::Enter,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" => KeyCode::PageUp,
        "pagedown" => KeyCode::PageDown,
        "backtab" => {
            modifiers.insert(KeyModifiers::SHIFT);
            KeyCode::BackTab
        }
        "backspace" => KeyCode::Backspace,
        "delete" => KeyCode::Delete,
        "insert" => KeyCode::Insert,
        "space" | "spacebar" => KeyCode::Char(' '),
        "hyphen" | "minus" => KeyCode::Char('-'),
        "tab" => KeyCode::Tab,
        f if f.len() > 1 && f.starts_with('f') && f[1..].parse::<u8>().is_ok_and(|n| (1..=12).contains(&n)) => {
            KeyCode::F(f[1..].parse().unwrap_or(1))
        }
        c if c.chars().count() == 1 => {
            let mut c = c.chars().next().unwrap_or_default();
            if modifiers.contains(KeyModifiers::SHIFT) {
                c = c.to_ascii_uppercase();
            }
            KeyCode::Char(c)
        }
        _ => return Err(format!("Unable to parse key binding: {raw}")),
    };
    Ok(KeyEvent::new(code, modifiers))
}

/// Parses a string into an optional [`Color`], handling "none"
fn parse_color(raw: &str) -> Result<Option<Color>, String> {
    let raw_lower = raw.to_ascii_lowercase();
    if raw_lower.is_empty() || raw_lower == "none" {
        Ok(None)
    } else {
        Ok(Some(parse_color_inner(&raw_lower)?))
    }
}

/// Parses a string into a [`ContentStyle`], including attributes and foreground color.
///
/// Examples: "red", "bold", "italic blue", "underline dim green".
fn parse_style(raw: &str) -> Result<ContentStyle, String> {
    let raw_lower = raw.to_ascii_lowercase();
    let mut attributes = Attributes::none();
    let mut words = raw_lower.split_whitespace().peekable();
    while let Some(word) = words.peek() {
        let attribute = match *word {
            "bold" => Attribute::Bold,
            "dim" => Attribute::Dim,
            "italic" => Attribute::Italic,
            "underline" | "underlined" => Attribute::Underlined,
            "reverse" => Attribute::Reverse,
            _ => break,
        };
        attributes.set(attribute);
        words.next();
    }
    let remaining = words.join(" ");

    let mut style = ContentStyle::new();
    style.attributes = attributes;
    if !remaining.is_empty() && remaining != "default" {
        style.foreground_color = Some(parse_color_inner(&remaining)?);
    }
    Ok(style)
}

/// Parses the color part of a style string.
///
/// Handles named colors, rgb, hex, and ansi values.
fn parse_color_inner(raw: &str) -> Result<Color, String> {
    let invalid = || format!("Unable to parse color: {raw}");
    Ok(match raw {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "gray" | "grey" => Color::Grey,
        "dark gray" | "darkgray" | "dark grey" | "darkgrey" => Color::DarkGrey,
        "dark red" | "darkred" => Color::DarkRed,
        "dark green" | "darkgreen" => Color::DarkGreen,
        "dark yellow" | "darkyellow" => Color::DarkYellow,
        "dark blue" | "darkblue" => Color::DarkBlue,
        "dark magenta" | "darkmagenta" => Color::DarkMagenta,
        "dark cyan" | "darkcyan" => Color::DarkCyan,
        "white" => Color::White,
        rgb if rgb.starts_with("rgb(") => {
            let rgb = rgb
                .trim_start_matches("rgb(")
                .trim_end_matches(')')
                .split(',')
                .map(|c| c.trim().parse::<u8>())
                .collect::<Result<Vec<u8>, _>>()
                .map_err(|_| invalid())?;
            let [r, g, b] = rgb[..] else {
                return Err(invalid());
            };
            Color::Rgb { r, g, b }
        }
        hex if hex.starts_with('#') => {
            let hex = hex.trim_start_matches('#');
            if hex.len() != 6 || !hex.is_ascii() {
                return Err(invalid());
            }
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
            Color::Rgb {
                r: channel(0)?,
                g: channel(2)?,
                b: channel(4)?,
            }
        }
        c => Color::AnsiValue(c.parse::<u8>().map_err(|_| invalid())?),
    })
}
