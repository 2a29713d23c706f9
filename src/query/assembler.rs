// src/query/assembler.rs
use lazy_static::lazy_static;
use log::{error, warn};
use regex::Regex;
use std::sync::Arc;

use crate::config::Config;
use crate::models::server::ServerConfig;
use crate::models::status::{Background, Cvars, StatusLabel, StatusSnapshot};
use crate::query::client::WireResponse;
use crate::query::parser::parse_status_response;

pub const DEFAULT_LEVELSHOT: &str = "default";
pub const DEFAULT_BACKGROUND_IMAGE_URL: &str = "/levelshots/default.jpg";

/// Some operators prefix `sv_hostname` with 0x80 bytes (a euro sign in
/// Windows-1252) to sort first in server browsers.
const SORT_PRIORITY_BYTE: u8 = 0x80;

const GAME_TYPES: [&str; 10] = [
    "FFA",
    "Holocron FFA",
    "Jedi Master",
    "Duel",
    "Power Duel",
    "Single Player FFA",
    "Team FFA",
    "Siege",
    "CTF (Capture The Flag)",
    "CTY (Capture The Ysalamiri)",
];

lazy_static! {
    static ref SAFE_MAP_NAME: Regex = Regex::new(r"^[a-z0-9_/]+$").unwrap();
}

/// Turns a wire response into a render-ready snapshot for one server.
#[derive(Debug, Clone)]
pub struct StatusAssembler {
    config: Arc<Config>,
}

impl StatusAssembler {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn assemble(&self, server: &ServerConfig, response: WireResponse) -> StatusSnapshot {
        let raw = match response {
            WireResponse::Success(raw) => raw,
            WireResponse::Timeout => return self.unavailable(server, StatusLabel::Timeout),
            WireResponse::NetworkError => return self.unavailable(server, StatusLabel::Down),
        };

        let parsed = match parse_status_response(&raw, server.charset, server.address.as_str()) {
            Ok(parsed) => parsed,
            Err(_) => return self.unavailable(server, StatusLabel::InvalidResponse),
        };

        let cvars = parsed.cvars;
        let players = parsed.players;
        let bot_count = players.iter().filter(|p| p.is_bot()).count();
        let map_name = cvars.get("mapname").map(str::to_string);

        StatusSnapshot {
            is_up: true,
            status: StatusLabel::Up,
            server_name: self.server_name(server, &cvars),
            address: server.address.to_string(),
            background: self.background(server, map_name.as_deref()),
            map_name,
            game_type: game_type(&cvars),
            mod_name: cvars.get("gamename").map(str::to_string),
            player_count: Some(players.len()),
            max_players: cvars.get("sv_maxclients").and_then(|v| v.trim().parse().ok()),
            human_count: Some(players.len() - bot_count),
            bot_count: Some(bot_count),
            players,
            cvars,
        }
    }

    fn unavailable(&self, server: &ServerConfig, status: StatusLabel) -> StatusSnapshot {
        error!("{} - Status: {}", server.address, status);
        StatusSnapshot::unavailable(
            status,
            server.name.clone(),
            server.address.to_string(),
            self.default_background(),
        )
    }

    fn server_name(&self, server: &ServerConfig, cvars: &Cvars) -> String {
        let name = cvars.get("sv_hostname").unwrap_or(server.name.as_str());
        let priority = server.charset.to_utf8(&[SORT_PRIORITY_BYTE]);
        if priority.is_empty() {
            return name.to_string();
        }
        name.trim_start_matches(priority.as_str()).to_string()
    }

    fn background(&self, server: &ServerConfig, map_name: Option<&str>) -> Background {
        let map_name = map_name.unwrap_or(DEFAULT_LEVELSHOT).to_lowercase();
        if SAFE_MAP_NAME.is_match(&map_name) {
            let path = self.config.levelshots_dir().join(format!("{map_name}.jpg"));
            if path.is_file() {
                return Background {
                    image_url: format!("/levelshots/{map_name}.jpg"),
                    blur_radius: self.config.background_blur_radius(&map_name),
                    opacity: self.config.background_opacity(&map_name),
                };
            }
        }

        warn!(
            "{} - Could not find levelshot for \"{}\". Using \"{}.jpg\".",
            server.address, map_name, DEFAULT_LEVELSHOT
        );
        self.default_background()
    }

    pub fn default_background(&self) -> Background {
        Background {
            image_url: DEFAULT_BACKGROUND_IMAGE_URL.to_string(),
            blur_radius: self.config.background_blur_radius(DEFAULT_LEVELSHOT),
            opacity: self.config.background_opacity(DEFAULT_LEVELSHOT),
        }
    }
}

fn game_type(cvars: &Cvars) -> Option<&'static str> {
    let code: usize = cvars.get("g_gametype")?.trim().parse().ok()?;
    GAME_TYPES.get(code).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::status::Player;
    use crate::test_support::capture_logs;
    use log::Level;
    use std::fs;
    use tempfile::TempDir;

    fn setup(charset: &str) -> (TempDir, StatusAssembler, ServerConfig) {
        let public = tempfile::tempdir().unwrap();
        fs::create_dir_all(public.path().join("levelshots/mp")).unwrap();
        fs::write(public.path().join("levelshots/default.jpg"), b"jpg").unwrap();
        fs::write(public.path().join("levelshots/mp/ffa3.jpg"), b"jpg").unwrap();
        fs::write(public.path().join("levelshots/mp/ctf2.jpg"), b"jpg").unwrap();

        let json = format!(
            r#"{{
                "public_dir": {:?},
                "default_background_blur_radius": 4,
                "background_blur_radius": {{ "mp/ctf2": 8 }},
                "servers": [ {{ "address": "192.0.2.1", "name": "^5Configured", "charset": "{charset}" }} ]
            }}"#,
            public.path().to_str().unwrap()
        );
        let config = Config::from_json(&json).unwrap();
        let server = config.servers[0].clone();
        (public, StatusAssembler::new(Arc::new(config)), server)
    }

    fn success(body: &[u8]) -> WireResponse {
        let mut raw = b"\xFF\xFF\xFF\xFFstatusResponse\n".to_vec();
        raw.extend_from_slice(body);
        WireResponse::Success(raw)
    }

    #[test]
    fn reference_response_counts_humans_and_bots() {
        let (_public, assembler, server) = setup("UTF-8");
        let snapshot = assembler.assemble(
            &server,
            success(b"\\mapname\\mp/ffa3\\sv_hostname\\Test\n0 50 \"Bot\"\n1 20 \"Human\""),
        );

        assert!(snapshot.is_up);
        assert_eq!(snapshot.status, StatusLabel::Up);
        assert_eq!(snapshot.server_name, "Test");
        assert_eq!(snapshot.map_name.as_deref(), Some("mp/ffa3"));
        assert_eq!(snapshot.player_count, Some(2));
        assert_eq!(snapshot.human_count, Some(2));
        assert_eq!(snapshot.bot_count, Some(0));
        assert_eq!(snapshot.background.image_url, "/levelshots/mp/ffa3.jpg");
        assert_eq!(snapshot.background.opacity, 50);
        assert_eq!(snapshot.background.blur_radius, 4);
    }

    #[test]
    fn zero_ping_counts_as_bot() {
        let (_public, assembler, server) = setup("UTF-8");
        let snapshot = assembler.assemble(
            &server,
            success(b"\\mapname\\mp/ffa3\n0 0 \"Bot\"\n1 20 \"Human\"\n"),
        );
        assert_eq!(snapshot.human_count, Some(1));
        assert_eq!(snapshot.bot_count, Some(1));
        assert_eq!(
            snapshot.players,
            vec![
                Player { name: "Human".into(), score: 1, ping: 20 },
                Player { name: "Bot".into(), score: 0, ping: 0 },
            ]
        );
    }

    #[test]
    fn derived_fields_from_cvars() {
        let (_public, assembler, server) = setup("UTF-8");
        let snapshot = assembler.assemble(
            &server,
            success(b"\\g_gametype\\8\\gamename\\^3Lugormod\\sv_maxclients\\32\\mapname\\MP/CTF2\n"),
        );
        assert_eq!(snapshot.game_type, Some("CTF (Capture The Flag)"));
        assert_eq!(snapshot.mod_name.as_deref(), Some("^3Lugormod"));
        assert_eq!(snapshot.max_players, Some(32));
        assert_eq!(snapshot.server_name, "^5Configured");
        assert_eq!(snapshot.player_count, Some(0));
        assert_eq!(snapshot.background.image_url, "/levelshots/mp/ctf2.jpg");
        assert_eq!(snapshot.background.opacity, 40);
        assert_eq!(snapshot.background.blur_radius, 8);
    }

    #[test]
    fn unknown_or_missing_game_type_is_absent() {
        let (_public, assembler, server) = setup("UTF-8");
        let bodies: [&[u8]; 3] = [b"\\g_gametype\\12\n", b"\\g_gametype\\ctf\n", b"\\mapname\\mp/ffa3\n"];
        for body in bodies {
            let snapshot = assembler.assemble(&server, success(body));
            assert_eq!(snapshot.game_type, None);
            assert_eq!(snapshot.max_players, None);
        }
    }

    #[test]
    fn euro_prefix_is_stripped_from_hostname() {
        let (_public, assembler, server) = setup("Windows-1252");
        let snapshot = assembler.assemble(&server, success(b"\\sv_hostname\\\x80\x80^1Top Server\x80\n"));
        assert_eq!(snapshot.server_name, "^1Top Server€");
    }

    #[test]
    fn unknown_map_falls_back_to_default_with_warning() {
        let (_public, assembler, server) = setup("UTF-8");
        let (snapshot, logs) = capture_logs(|| {
            assembler.assemble(&server, success(b"\\mapname\\nonexistent/map\n"))
        });

        assert_eq!(snapshot.background.image_url, DEFAULT_BACKGROUND_IMAGE_URL);
        assert_eq!(snapshot.background.opacity, 50);
        assert_eq!(snapshot.background.blur_radius, 4);
        assert_eq!(snapshot.map_name.as_deref(), Some("nonexistent/map"));
        assert!(logs.iter().any(|(level, msg)| *level == Level::Warn
            && msg.contains("Could not find levelshot for \"nonexistent/map\"")));
    }

    #[test]
    fn unsafe_map_names_are_not_looked_up() {
        let (_public, assembler, server) = setup("UTF-8");
        for map in ["../default", "mp/ffa3.jpg", "mp ffa3"] {
            let body = format!("\\mapname\\{map}\n");
            let snapshot = assembler.assemble(&server, success(body.as_bytes()));
            assert_eq!(snapshot.background.image_url, DEFAULT_BACKGROUND_IMAGE_URL, "{map}");
        }
    }

    #[test]
    fn failures_produce_empty_snapshots() {
        let (_public, assembler, server) = setup("UTF-8");
        let cases = [
            (WireResponse::Timeout, StatusLabel::Timeout, "Timeout"),
            (WireResponse::NetworkError, StatusLabel::Down, "Down"),
            (WireResponse::Success(Vec::new()), StatusLabel::InvalidResponse, "Invalid response"),
        ];

        for (response, label, text) in cases {
            let (snapshot, logs) = capture_logs(|| assembler.assemble(&server, response));
            assert!(!snapshot.is_up);
            assert_eq!(snapshot.status, label);
            assert_eq!(snapshot.server_name, "^5Configured");
            assert_eq!(snapshot.background, assembler.default_background());
            assert!(snapshot.players.is_empty());
            assert!(snapshot.cvars.is_empty());
            assert_eq!(snapshot.map_name, None);
            assert_eq!(snapshot.player_count, None);
            assert_eq!(
                logs,
                vec![(Level::Error, format!("192.0.2.1 - Status: {text}"))]
            );
        }
    }
}
