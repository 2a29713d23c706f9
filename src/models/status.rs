// src/models/status.rs
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Raw name, may contain color codes
    pub name: String,
    pub score: i64,
    pub ping: u32,
}

impl Player {
    /// Bots always report a ping of 0.
    pub fn is_bot(&self) -> bool {
        self.ping == 0
    }
}

/// Server variables keyed by name, kept in natural case-insensitive order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cvars(Vec<(String, String)>);

impl Cvars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a value, keeping the key order. Keys that compare
    /// equal but are spelled differently stay distinct, in arrival order.
    pub fn insert(&mut self, name: String, value: String) {
        if let Some(entry) = self.0.iter_mut().find(|(existing, _)| *existing == name) {
            entry.1 = value;
            return;
        }
        let index = self.0.partition_point(|(existing, _)| {
            natural_cmp_ignore_case(existing, &name) != Ordering::Greater
        });
        self.0.insert(index, (name, value));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Natural ordering ignoring ASCII case: digit runs compare by numeric value,
/// so "g_2" sorts before "g_10".
pub fn natural_cmp_ignore_case(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_run = take_digits(&mut left);
                let r_run = take_digits(&mut right);
                let l_num = l_run.trim_start_matches('0');
                let r_num = r_run.trim_start_matches('0');
                let ordering = l_num
                    .len()
                    .cmp(&r_num.len())
                    .then_with(|| l_num.cmp(r_num))
                    .then_with(|| l_run.len().cmp(&r_run.len()));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                let ordering = l.to_ascii_lowercase().cmp(&r.to_ascii_lowercase());
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        run.push(c);
    }
    run
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLabel {
    Up,
    Down,
    Timeout,
    InvalidResponse,
}

impl StatusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "Up",
            Self::Down => "Down",
            Self::Timeout => "Timeout",
            Self::InvalidResponse => "Invalid response",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page background derived from the current map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Background {
    /// Root-relative URL, without the asset prefix (e.g. "/levelshots/mp/ffa3.jpg")
    pub image_url: String,
    pub blur_radius: u8,
    /// Percentage [0-100]
    pub opacity: u8,
}

/// Render-ready outcome of one status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub is_up: bool,
    pub status: StatusLabel,
    pub server_name: String,
    pub address: String,
    pub map_name: Option<String>,
    pub game_type: Option<&'static str>,
    pub mod_name: Option<String>,
    pub player_count: Option<usize>,
    pub max_players: Option<i64>,
    pub human_count: Option<usize>,
    pub bot_count: Option<usize>,
    pub players: Vec<Player>,
    pub cvars: Cvars,
    pub background: Background,
}

impl StatusSnapshot {
    /// Snapshot for a server that could not be queried or answered garbage.
    pub fn unavailable(
        status: StatusLabel,
        server_name: String,
        address: String,
        background: Background,
    ) -> Self {
        Self {
            is_up: false,
            status,
            server_name,
            address,
            map_name: None,
            game_type: None,
            mod_name: None,
            player_count: None,
            max_players: None,
            human_count: None,
            bot_count: None,
            players: Vec::new(),
            cvars: Cvars::new(),
            background,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order_ignores_case_and_compares_numbers() {
        let mut keys = vec!["sv_maxclients", "G_GameType", "g_10", "g_2", "Mapname", "fraglimit"];
        keys.sort_by(|a, b| natural_cmp_ignore_case(a, b));
        assert_eq!(
            keys,
            vec!["fraglimit", "g_2", "g_10", "G_GameType", "Mapname", "sv_maxclients"]
        );
    }

    #[test]
    fn cvars_stay_sorted_and_last_value_wins() {
        let mut cvars = Cvars::new();
        cvars.insert("sv_hostname".into(), "First".into());
        cvars.insert("mapname".into(), "mp/ffa3".into());
        cvars.insert("G_gametype".into(), "0".into());
        cvars.insert("sv_hostname".into(), "Second".into());

        assert_eq!(
            cvars.keys().collect::<Vec<_>>(),
            vec!["G_gametype", "mapname", "sv_hostname"]
        );
        assert_eq!(cvars.get("sv_hostname"), Some("Second"));
        assert_eq!(cvars.len(), 3);
    }

    #[test]
    fn keys_differing_only_by_case_are_distinct() {
        let mut cvars = Cvars::new();
        cvars.insert("Version".into(), "a".into());
        cvars.insert("version".into(), "b".into());
        assert_eq!(cvars.len(), 2);
        assert_eq!(cvars.get("Version"), Some("a"));
        assert_eq!(cvars.get("version"), Some("b"));
    }

    #[test]
    fn unavailable_snapshot_has_no_data() {
        let snapshot = StatusSnapshot::unavailable(
            StatusLabel::Timeout,
            "name".into(),
            "192.0.2.1".into(),
            Background {
                image_url: "/levelshots/default.jpg".into(),
                blur_radius: 5,
                opacity: 50,
            },
        );
        assert!(!snapshot.is_up);
        assert!(snapshot.players.is_empty());
        assert!(snapshot.cvars.is_empty());
        assert_eq!(snapshot.player_count, None);
        assert_eq!(snapshot.status.to_string(), "Timeout");
    }
}
