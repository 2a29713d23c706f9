// src/templates/mod.rs
pub mod format;

use log::warn;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crate::config::Config;
use crate::models::status::StatusSnapshot;
use crate::query::assembler::{DEFAULT_BACKGROUND_IMAGE_URL, DEFAULT_LEVELSHOT};
pub use format::{escape_html, format_name, strip_colors};

const SITE_TITLE: &str = "JKA Server Status";
const OG_DESCRIPTION: &str = "Status page for a Jedi Academy server - basic status data, online players, ...";
const SOURCE_URL: &str = "https://github.com/slash-fr/jka-server-status";

/// Renders the HTML pages. Holds no state besides the configuration.
#[derive(Debug, Clone)]
pub struct Templates {
    config: Arc<Config>,
}

impl Templates {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Full URL for a file under the public directory, with a cache busting
    /// `version` parameter taken from its modification time.
    pub fn asset(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let separator = if path.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}version={}",
            self.config.root_url,
            path,
            separator,
            self.asset_version(&path)
        )
    }

    fn asset_version(&self, path: &str) -> String {
        let file = path.split('?').next().unwrap_or(path).trim_start_matches('/');
        let modified = std::fs::metadata(self.config.public_dir.join(file))
            .and_then(|metadata| metadata.modified())
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok());

        match modified {
            Some(since_epoch) => since_epoch.as_secs().to_string(),
            None => {
                warn!(
                    "Could not read the file modification time, to build the query string for asset(\"{}\"). Defaulting to \"?version=1\"",
                    path
                );
                "1".to_string()
            }
        }
    }

    /// `page_uri` is the path the page is served at. OpenGraph tags are only
    /// emitted when it is given and a canonical URL is configured.
    fn head(&self, title: Option<&str>, page_uri: Option<&str>) -> String {
        let title = match title {
            Some(title) if !title.is_empty() => format!("{SITE_TITLE} - {}", escape_html(title)),
            _ => SITE_TITLE.to_string(),
        };
        let mut head = String::new();
        head.push_str("<meta charset=\"utf-8\"/>\n");
        head.push_str(&format!("<title>{title}</title>\n"));
        head.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\" />\n");
        head.push_str(&format!(
            "<link href=\"{}\" rel=\"stylesheet\" />\n",
            escape_html(&self.asset("/style.css"))
        ));
        head.push_str(&format!(
            "<link rel=\"icon\" type=\"image/png\" href=\"{}\" sizes=\"96x96\" />\n",
            escape_html(&self.asset("/favicon-96x96.png"))
        ));
        head.push_str(&format!(
            "<link rel=\"icon\" type=\"image/svg+xml\" href=\"{}\" />\n",
            escape_html(&self.asset("/favicon.svg"))
        ));
        head.push_str(&format!(
            "<link rel=\"shortcut icon\" href=\"{}\" />\n",
            escape_html(&self.asset("/favicon.ico"))
        ));
        if let (Some(canonical_url), Some(page_uri)) = (&self.config.canonical_url, page_uri) {
            head.push_str(&self.open_graph(&title, canonical_url, page_uri));
        }
        head
    }

    /// `title` is already escaped.
    fn open_graph(&self, title: &str, canonical_url: &str, page_uri: &str) -> String {
        let image = self.asset("/og-image.jpg");
        let image = if image.starts_with("https://") || image.starts_with("http://") {
            image
        } else {
            format!("{canonical_url}{image}")
        };

        let mut tags = String::new();
        tags.push_str(&format!("<meta property=\"og:title\" content=\"{title}\" />\n"));
        tags.push_str("<meta property=\"og:type\" content=\"website\" />\n");
        tags.push_str(&format!(
            "<meta property=\"og:url\" content=\"{}\" />\n",
            escape_html(&format!("{canonical_url}{page_uri}"))
        ));
        tags.push_str(&format!("<meta property=\"og:image\" content=\"{}\" />\n", escape_html(&image)));
        tags.push_str("<meta property=\"og:image:width\" content=\"1200\" />\n");
        tags.push_str("<meta property=\"og:image:height\" content=\"630\" />\n");
        tags.push_str(&format!("<meta property=\"og:description\" content=\"{OG_DESCRIPTION}\" />\n"));
        tags.push_str("<meta name=\"twitter:card\" content=\"summary_large_image\" />\n");
        tags
    }

    fn home_button(&self) -> String {
        if !self.config.landing_page_enabled {
            return String::new();
        }
        format!(
            "<a href=\"{}\" id=\"home-button\" class=\"button\" title=\"Go back to the server list\">{} Server list</a>\n",
            escape_html(&self.config.landing_page_uri),
            self.icon("/favicon.svg", 16)
        )
    }

    fn icon(&self, path: &str, size: u32) -> String {
        format!(
            "<img src=\"{}\" width=\"{size}\" height=\"{size}\" alt=\"\" aria-hidden=\"true\" />",
            escape_html(&self.asset(path))
        )
    }

    pub fn status_page(&self, page_uri: &str, snapshot: &StatusSnapshot) -> String {
        let current_background = self.asset(&snapshot.background.image_url);
        let default_background = self.asset(DEFAULT_BACKGROUND_IMAGE_URL);

        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str(&self.head(Some(&strip_colors(&snapshot.server_name)), Some(page_uri)));
        html.push_str("</head>\n<body>\n");

        // The script picks the image itself; this one is only for visitors without it.
        html.push_str(&format!(
            "<noscript><div id=\"background-image\" style=\"background-image: url({}); opacity: {}%;\"></div></noscript>\n",
            escape_html(&current_background),
            snapshot.background.opacity
        ));
        html.push_str(&format!(
            "<input type=\"hidden\" id=\"current-background-image\" value=\"{}\" />\n",
            escape_html(&current_background)
        ));
        html.push_str(&format!(
            "<input type=\"hidden\" id=\"default-background-image\" value=\"{}\" />\n",
            escape_html(&default_background)
        ));
        html.push_str(&format!(
            "<input type=\"hidden\" id=\"background-image-blur-radius-value\" value=\"{}\" />\n",
            snapshot.background.blur_radius
        ));
        html.push_str(&format!(
            "<input type=\"hidden\" id=\"background-image-opacity-value\" value=\"{}\" />\n",
            snapshot.background.opacity
        ));

        html.push_str("<div id=\"content\">\n<header>\n");
        html.push_str(&self.home_button());
        html.push_str("</header>\n<div id=\"main-content\">\n");
        html.push_str(&format!("<h1>{}</h1>\n", format_name(&snapshot.server_name)));
        html.push_str(&self.info_panel(snapshot));
        if !snapshot.players.is_empty() {
            html.push_str(&player_table(snapshot));
        }
        html.push_str("</div>\n");

        html.push_str("<footer>\n<p id=\"refreshed-footer\" class=\"bonus-info\"></p>\n<p id=\"settings-footer\">\n");
        html.push_str(&format!(
            "<button id=\"refresh-button\" onclick=\"location.reload()\">{} Refresh</button>\n",
            self.icon("/refresh.svg", 20)
        ));
        if !snapshot.cvars.is_empty() {
            html.push_str(&format!(
                "<button id=\"open-cvars\">{} Server info</button>\n",
                self.icon("/terminal-20x20.png", 20)
            ));
        }
        html.push_str(&format!(
            "<button id=\"open-settings\">{} Settings</button>\n",
            self.icon("/settings-sharp.svg", 20)
        ));
        html.push_str("</p>\n</footer>\n</div>\n");

        html.push_str(&self.settings_panel());
        if !snapshot.cvars.is_empty() {
            html.push_str(&self.cvars_panel(snapshot));
        }
        html.push_str(&format!(
            "<script src=\"{}\"></script>\n</body>\n</html>\n",
            escape_html(&self.asset("/main.js"))
        ));
        html
    }

    fn info_panel(&self, snapshot: &StatusSnapshot) -> String {
        let mut info = String::from("<p class=\"info\">\n");
        info.push_str(&format!(
            "<label>Address:</label> <span>{}</span>\n",
            escape_html(&snapshot.address)
        ));
        let status_icon = if snapshot.is_up {
            "/checkmark-circle.svg"
        } else {
            "/alert-circle.svg"
        };
        info.push_str(&format!(
            "<label>Status:</label> <span class=\"status\">{} {}</span>\n",
            self.icon(status_icon, 20),
            escape_html(snapshot.status.as_str())
        ));
        if let Some(map_name) = &snapshot.map_name {
            info.push_str(&format!(
                "<label>Map name:</label> <span>{}</span>\n",
                escape_html(map_name)
            ));
        }
        if let Some(game_type) = snapshot.game_type {
            info.push_str(&format!(
                "<label>Game type:</label> <span>{}</span>\n",
                escape_html(game_type)
            ));
        }
        if let Some(mod_name) = &snapshot.mod_name {
            info.push_str(&format!(
                "<label>Mod name:</label> <span>{}</span>\n",
                format_name(mod_name)
            ));
        }
        if let Some(player_count) = snapshot.player_count {
            let mut players = player_count.to_string();
            if let Some(max_players) = snapshot.max_players {
                players.push_str(&format!(" / {max_players}"));
            }
            if let Some(humans) = snapshot.human_count {
                let noun = if humans == 1 { "human" } else { "humans" };
                players.push_str(&format!(" <span class=\"bonus-info\">({humans} {noun})</span>"));
            }
            info.push_str(&format!("<label>Players:</label> <span>{players}</span>\n"));
        }
        info.push_str("</p>\n");
        info
    }

    fn settings_panel(&self) -> String {
        let mut settings = String::from("<div id=\"settings\">\n");
        settings.push_str(&format!("<h2>{} Settings</h2>\n", self.icon("/settings-sharp.svg", 24)));
        settings.push_str(concat!(
            "<p id=\"setting-grid\">\n",
            "<label for=\"auto-refresh-select\">Auto-refresh:</label>\n",
            "<select id=\"auto-refresh-select\">",
            "<option value=\"0\">Disabled</option>",
            "<option value=\"1\">Every minute</option>",
            "<option value=\"2\">Every 2 minutes</option>",
            "<option value=\"5\">Every 5 minutes</option>",
            "<option value=\"10\">Every 10 minutes</option>",
            "<option value=\"20\">Every 20 minutes</option>",
            "<option value=\"30\">Every 30 minutes</option>",
            "<option value=\"60\">Every hour</option>",
            "</select>\n",
            "<label for=\"background-image-select\">Background image:</label>\n",
            "<select id=\"background-image-select\">",
            "<option value=\"disabled\">Disabled</option>",
            "<option value=\"map-dependent\">Map-dependent</option>",
            "<option value=\"always-default\">Always use \"default.jpg\"</option>",
            "</select>\n",
            "<label for=\"background-image-blur-slider\" class=\"background-image-tweak\">Image blur:</label>\n",
            "<span class=\"slider-container background-image-tweak\">",
            "<input id=\"background-image-blur-slider\" type=\"range\" min=\"0\" max=\"10\" />",
            "<span id=\"background-image-blur-radius\"></span></span>\n",
            "<label for=\"background-image-opacity-slider\" class=\"background-image-tweak\">Image opacity:</label>\n",
            "<span class=\"slider-container background-image-tweak\">",
            "<input id=\"background-image-opacity-slider\" type=\"range\" min=\"0\" max=\"100\" />",
            "<span id=\"background-image-opacity-percentage\"></span></span>\n",
            "<label for=\"background-color-input\">Background color:</label>\n",
            "<input id=\"background-color-input\" type=\"color\" />\n",
            "</p>\n",
        ));
        settings.push_str(&format!(
            "<button id=\"close-settings\">{} Close settings</button>\n</div>\n",
            self.icon("/close-circle.svg", 20)
        ));
        settings
    }

    fn cvars_panel(&self, snapshot: &StatusSnapshot) -> String {
        let mut panel = String::from("<div id=\"cvars\">\n");
        panel.push_str(&format!("<h2>{} Server info</h2>\n", self.icon("/terminal-sharp.svg", 24)));
        panel.push_str("<div id=\"cvar-grid\">\n");
        for (name, value) in snapshot.cvars.iter() {
            panel.push_str(&format!(
                "<label>{}</label> <span>{}</span>\n",
                escape_html(name),
                format_name(value)
            ));
        }
        panel.push_str("</div>\n");
        panel.push_str(&format!(
            "<button id=\"close-cvars\">{} Close server info</button>\n</div>\n",
            self.icon("/close-circle.svg", 20)
        ));
        panel
    }

    pub fn landing_page(&self) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str(&self.head(None, Some(self.config.landing_page_uri.as_str())));
        html.push_str("</head>\n<body class=\"landing-page\">\n");
        html.push_str(&format!(
            "<div id=\"background-image\" style=\"background-image: url({}); opacity: {}%;\"></div>\n",
            escape_html(&self.asset(DEFAULT_BACKGROUND_IMAGE_URL)),
            self.config.background_opacity(DEFAULT_LEVELSHOT)
        ));
        html.push_str("<div id=\"content\">\n<header></header>\n<article id=\"main-content\">\n");
        html.push_str(&format!(
            "<h1>{} <span class=\"white\">{SITE_TITLE}</span></h1>\n",
            self.icon("/favicon.svg", 16)
        ));
        for server in &self.config.servers {
            html.push_str(&format!(
                "<a class=\"button\" href=\"{}\">{}",
                escape_html(&server.uri),
                format_name(&server.name)
            ));
            if !server.subtitle.is_empty() {
                html.push_str(&format!(
                    "<br/><span class=\"subtitle\">{}</span>",
                    escape_html(&server.subtitle)
                ));
            }
            html.push_str("</a>\n");
        }
        html.push_str("</article>\n<footer>\n");
        if self.config.about_page_enabled {
            html.push_str(&format!(
                "<p class=\"footnote bonus-info\"><a href=\"{}\">{}</a></p>\n",
                escape_html(&self.config.about_page_uri),
                escape_html(&self.config.about_page_title)
            ));
        }
        html.push_str("</footer>\n</div>\n</body>\n</html>\n");
        html
    }

    pub fn about_page(&self) -> String {
        let title = &self.config.about_page_title;
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str(&self.head(Some(title.as_str()), Some(self.config.about_page_uri.as_str())));
        html.push_str("</head>\n<body class=\"about-page\">\n<div id=\"content\">\n<header>\n");
        html.push_str(&self.home_button());
        html.push_str("</header>\n<article id=\"main-content\">\n");
        html.push_str(&format!(
            "<h1>{} <span class=\"white\">{}</span></h1>\n",
            self.icon("/favicon.svg", 16),
            escape_html(title)
        ));
        html.push_str(&format!(
            concat!(
                "<h2>Credits</h2>\n",
                "<p><strong>{site}</strong> is an Open Source tool.</p>\n",
                "<p>The source code is available on <strong>GitHub</strong>, under the terms of the <strong>MIT License</strong>:<br/>\n",
                "<a href=\"{source}\" target=\"_blank\">{source}</a></p>\n",
            ),
            site = SITE_TITLE,
            source = SOURCE_URL
        ));
        html.push_str("</article>\n<footer></footer>\n</div>\n</body>\n</html>\n");
        html
    }

    pub fn not_found_page(&self) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str(&self.head(Some("404 Not Found"), None));
        html.push_str("</head>\n<body class=\"page-not-found\">\n");
        html.push_str("<h1><span class=\"white\">404 Not Found</span></h1>\n");
        html.push_str(&format!(
            "<img src=\"{}\" alt=\"This isn't the webpage you're looking for.\" title=\"Move along.\"/>\n",
            escape_html(&self.asset("/404.jpg"))
        ));
        html.push_str("</body>\n</html>\n");
        html
    }
}

fn player_table(snapshot: &StatusSnapshot) -> String {
    let mut table = String::from(
        "<table class=\"player-list\">\n<thead>\n<tr><th>Name</th><th class=\"score\">Score</th><th class=\"ping\">Ping</th></tr>\n</thead>\n<tbody>\n",
    );
    for player in &snapshot.players {
        table.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            format_name(&player.name),
            player.score,
            player.ping
        ));
    }
    table.push_str("</tbody>\n</table>\n");
    table
}
