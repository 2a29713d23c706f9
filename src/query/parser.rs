// src/query/parser.rs
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use thiserror::Error;

use crate::charset::Charset;
use crate::models::status::{Cvars, Player};

pub const STATUS_RESPONSE_HEADER: &[u8] = b"\xFF\xFF\xFF\xFFstatusResponse";

lazy_static! {
    static ref PLAYER_LINE: Regex = Regex::new(r"^(-?[0-9]+)[ \t]+([0-9]+)[ \t]+(.+)$").unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid response")]
    InvalidResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub cvars: Cvars,
    /// Sorted by score, highest first
    pub players: Vec<Player>,
}

/// Decodes a raw `statusResponse` datagram. `address` only labels warnings.
pub fn parse_status_response(
    raw: &[u8],
    charset: Charset,
    address: &str,
) -> Result<StatusResponse, ParseError> {
    let normalized: Vec<u8> = raw.iter().copied().filter(|&b| b != b'\r').collect();
    let lines: Vec<&[u8]> = normalized.split(|&b| b == b'\n').collect();

    if lines.len() < 2 || lines[0] != STATUS_RESPONSE_HEADER || !lines[1].starts_with(b"\\") {
        return Err(ParseError::InvalidResponse);
    }

    let lines: Vec<String> = lines[1..].iter().map(|line| charset.to_utf8(line)).collect();
    let cvars = parse_cvars(&lines[0]);
    let players = parse_players(&lines[1..], address);

    Ok(StatusResponse { cvars, players })
}

/// `\key1\value1\key2\value2...`, an unpaired trailing key is dropped.
pub fn parse_cvars(line: &str) -> Cvars {
    let mut cvars = Cvars::new();
    let mut fields = line.strip_prefix('\\').unwrap_or(line).split('\\');

    while let (Some(name), Some(value)) = (fields.next(), fields.next()) {
        cvars.insert(name.to_string(), value.to_string());
    }

    cvars
}

/// One `<score> <ping> "<name>"` line per entity. A blank final line is
/// expected; any other malformed line is skipped with a warning.
pub fn parse_players(lines: &[String], address: &str) -> Vec<Player> {
    let mut players = Vec::with_capacity(lines.len());

    for (index, line) in lines.iter().enumerate() {
        if index + 1 == lines.len() && line.is_empty() {
            break;
        }

        match parse_player_line(line) {
            Some(player) => players.push(player),
            None => warn!(
                "{} - The server response contains an invalid player line: {:?}",
                address, line
            ),
        }
    }

    sort_players(&mut players);
    players
}

fn parse_player_line(line: &str) -> Option<Player> {
    let captures = PLAYER_LINE.captures(line)?;
    // Out-of-range numbers saturate rather than dropping the player.
    let score = captures[1].parse::<i64>().unwrap_or(if captures[1].starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    });
    let ping = captures[2].parse::<u32>().unwrap_or(u32::MAX);
    let name = &captures[3];
    let name = name.strip_prefix('"').unwrap_or(name);
    let name = name.strip_suffix('"').unwrap_or(name);

    Some(Player {
        name: name.to_string(),
        score,
        ping,
    })
}

/// Highest score first. The sort is stable, so ties keep the order in which
/// the server listed the players.
pub fn sort_players(players: &mut [Player]) {
    players.sort_by(|a, b| b.score.cmp(&a.score));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::capture_logs;
    use log::Level;

    fn utf8() -> Charset {
        Charset::for_label("UTF-8").unwrap()
    }

    fn player(name: &str, score: i64, ping: u32) -> Player {
        Player {
            name: name.to_string(),
            score,
            ping,
        }
    }

    #[test]
    fn parses_reference_response() {
        let raw = b"\xFF\xFF\xFF\xFFstatusResponse\n\\mapname\\mp/ffa3\\sv_hostname\\Test\n0 50 \"Bot\"\n1 20 \"Human\"";
        let response = parse_status_response(raw, utf8(), "test").unwrap();

        assert_eq!(
            response.cvars.iter().collect::<Vec<_>>(),
            vec![("mapname", "mp/ffa3"), ("sv_hostname", "Test")]
        );
        assert_eq!(
            response.players,
            vec![player("Human", 1, 20), player("Bot", 0, 50)]
        );
    }

    #[test]
    fn rejects_malformed_structure() {
        let cases: [&[u8]; 5] = [
            b"",
            b"\xFF\xFF\xFF\xFFstatusResponse",
            b"\xFF\xFF\xFF\xFFinfoResponse\n\\a\\b",
            b"statusResponse\n\\a\\b",
            b"\xFF\xFF\xFF\xFFstatusResponse\nmapname\\mp/ffa3",
        ];
        for raw in cases {
            assert_eq!(
                parse_status_response(raw, utf8(), "test"),
                Err(ParseError::InvalidResponse),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn carriage_returns_are_ignored() {
        let raw = b"\xFF\xFF\xFF\xFFstatusResponse\r\n\\g_gametype\\6\r\n3 40 \"Kyle\"\r\n";
        let response = parse_status_response(raw, utf8(), "test").unwrap();
        assert_eq!(response.cvars.get("g_gametype"), Some("6"));
        assert_eq!(response.players, vec![player("Kyle", 3, 40)]);
    }

    #[test]
    fn cvars_are_naturally_sorted_and_odd_token_dropped() {
        let cvars = parse_cvars("\\sv_maxclients\\32\\G_GameType\\0\\g_2\\x\\g_10\\y\\dangling");
        assert_eq!(
            cvars.keys().collect::<Vec<_>>(),
            vec!["g_2", "g_10", "G_GameType", "sv_maxclients"]
        );
        assert_eq!(cvars.get("dangling"), None);
    }

    #[test]
    fn empty_values_are_kept() {
        let cvars = parse_cvars("\\sv_hostname\\\\mapname\\mp/ffa3");
        assert_eq!(cvars.get("sv_hostname"), Some(""));
        assert_eq!(cvars.get("mapname"), Some("mp/ffa3"));
    }

    #[test]
    fn invalid_player_lines_are_skipped_with_one_warning_each() {
        let lines: Vec<String> = [
            "5 10 \"Good\"",
            "not a player",
            "",
            "-2 0 \"Negative\"",
            "1 -5 \"NegativePing\"",
            "7 12",
            "",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let (players, logs) = capture_logs(|| parse_players(&lines, "192.0.2.1"));

        assert_eq!(players, vec![player("Good", 5, 10), player("Negative", -2, 0)]);
        let warnings: Vec<_> = logs.iter().filter(|(level, _)| *level == Level::Warn).collect();
        assert_eq!(warnings.len(), 4, "{logs:?}");
        assert!(warnings
            .iter()
            .all(|(_, msg)| msg.starts_with("192.0.2.1 - The server response contains an invalid player line")));
    }

    #[test]
    fn oversized_numbers_saturate() {
        let lines: Vec<String> = [
            "5 4294967296 \"BigPing\"",
            "99999999999999999999 10 \"BigScore\"",
            "-99999999999999999999 10 \"SmallScore\"",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let (players, logs) = capture_logs(|| parse_players(&lines, "192.0.2.1"));

        assert_eq!(
            players,
            vec![
                player("BigScore", i64::MAX, 10),
                player("BigPing", 5, u32::MAX),
                player("SmallScore", i64::MIN, 10),
            ]
        );
        assert!(logs.is_empty(), "{logs:?}");
    }

    #[test]
    fn only_spaces_and_tabs_separate_fields() {
        let lines: Vec<String> = ["1\t20\t\"Tabbed\"", "1\u{a0}20 \"Nbsp\"", "2 30\u{2003}\"EmSpace\""]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let (players, logs) = capture_logs(|| parse_players(&lines, "192.0.2.1"));

        assert_eq!(players, vec![player("Tabbed", 1, 20)]);
        let warnings = logs.iter().filter(|(level, _)| *level == Level::Warn).count();
        assert_eq!(warnings, 2, "{logs:?}");

        // 0xA0 is a no-break space in Windows-1252.
        let raw = b"\xFF\xFF\xFF\xFFstatusResponse\n\\mapname\\mp/ffa3\n1\xA020 \"Nbsp\"\n";
        let charset = Charset::for_label("Windows-1252").unwrap();
        let response = parse_status_response(raw, charset, "test").unwrap();
        assert!(response.players.is_empty());
    }

    #[test]
    fn trailing_blank_line_is_silent() {
        let lines = vec!["1 1 \"a\"".to_string(), String::new()];
        let (players, logs) = capture_logs(|| parse_players(&lines, "test"));
        assert_eq!(players.len(), 1);
        assert!(logs.is_empty());
    }

    #[test]
    fn one_layer_of_quotes_is_trimmed() {
        let lines = vec![
            "1 1 \"\"quoted\"\"".to_string(),
            "2 1 bare name".to_string(),
            "3 1 \"^1Red ^7Jedi\"".to_string(),
        ];
        let players = parse_players(&lines, "test");
        let names: Vec<_> = players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["^1Red ^7Jedi", "bare name", "\"quoted\""]);
    }

    #[test]
    fn ties_keep_arrival_order() {
        let lines: Vec<String> = ["4 90 \"first\"", "9 10 \"top\"", "4 5 \"second\"", "4 0 \"third\""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let players = parse_players(&lines, "test");
        let names: Vec<_> = players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["top", "first", "second", "third"]);

        let mut resorted = players.clone();
        sort_players(&mut resorted);
        assert_eq!(resorted, players);
    }

    #[test]
    fn player_names_are_decoded_with_declared_charset() {
        let raw = b"\xFF\xFF\xFF\xFFstatusResponse\n\\sv_hostname\\\x80\x80Caf\xe9\n2 30 \"Se\xf1or\"\n";
        let response =
            parse_status_response(raw, Charset::for_label("Windows-1252").unwrap(), "test").unwrap();
        assert_eq!(response.cvars.get("sv_hostname"), Some("€€Café"));
        assert_eq!(response.players[0].name, "Señor");
    }

    #[test]
    fn undecodable_bytes_are_dropped() {
        let raw = b"\xFF\xFF\xFF\xFFstatusResponse\n\\sv_hostname\\ab\xffcd\n";
        let response = parse_status_response(raw, utf8(), "test").unwrap();
        assert_eq!(response.cvars.get("sv_hostname"), Some("abcd"));
    }
}
