//! Session title derivation
//!
//! A title is either captured from a title escape sequence (and shortened by
//! [`truncate_title`]) or rendered from a template such as
//! `"({{ bashName }}) on {{ hostName }}"`.

use std::path::MAIN_SEPARATOR;

/// Template used when the configuration does not name one
pub const DEFAULT_TITLE_TEMPLATE: &str = "({{ bashName }})";

/// Titles up to this many characters are kept as-is
const PASS_THROUGH_LEN: usize = 20;
/// Longest accepted `<sep>first<sep>...<sep>last` abbreviation
const ABBREVIATED_MAX_LEN: usize = 25;
/// Characters kept on each side of a clipped title
const CLIP_KEEP: usize = 10;
const ELLIPSIS: &str = "...";

/// Values available to title templates, captured once per session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleVars {
    /// Basename of the shell binary
    pub bash_name: String,
    pub host_name: String,
    /// Platform identifier (`linux`, `macos`, `windows`, ...)
    pub platform: String,
    pub home: String,
}

impl TitleVars {
    /// Snapshot the environment for a session running `shell`
    pub fn capture(shell: &str) -> Self {
        Self {
            bash_name: shell_basename(shell).to_string(),
            host_name: host_name(),
            platform: std::env::consts::OS.to_string(),
            home: dirs::home_dir()
                .map(|home| home.display().to_string())
                .unwrap_or_default(),
        }
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "bashName" => Some(&self.bash_name),
            "hostName" => Some(&self.host_name),
            "platform" => Some(&self.platform),
            "home" => Some(&self.home),
            _ => None,
        }
    }
}

/// Replace `{{ name }}` placeholders with their values.
///
/// Whitespace inside the braces is ignored. Unknown names and unterminated
/// braces are left in the output untouched.
pub fn render_template(template: &str, vars: &TitleVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        match vars.lookup(after[..end].trim()) {
            Some(value) => {
                out.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                // Keep the braces and rescan what follows them
                out.push_str("{{");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Shorten a title captured from an escape sequence, using the platform
/// path separator
pub fn truncate_title(title: &str) -> String {
    truncate_title_with(title, MAIN_SEPARATOR)
}

/// Shorten `title`, treating `separator` as the path separator.
///
/// - up to 20 characters: unchanged
/// - path-like: `<sep>first<sep>...<sep>last`, unless that or the title itself
///   is longer than 25 characters
/// - otherwise: first 10 characters, `...`, last 10 characters
///
/// Already clipped titles come back unchanged.
pub fn truncate_title_with(title: &str, separator: char) -> String {
    let len = title.chars().count();
    if len <= PASS_THROUGH_LEN || is_clipped(title) {
        return title.to_string();
    }

    let mut segments: Vec<&str> = title.split(separator).collect();
    if segments.first() == Some(&"") {
        segments.remove(0);
    }
    if segments.len() <= 1 {
        return clip(title);
    }

    let sep = separator.to_string();
    let first = segments[0];
    let last = segments[segments.len() - 1];
    let abbreviated = [sep.as_str(), first, &sep, ELLIPSIS, &sep, last].concat();

    if len > ABBREVIATED_MAX_LEN || abbreviated.chars().count() > ABBREVIATED_MAX_LEN {
        clip(title)
    } else {
        abbreviated
    }
}

fn clip(title: &str) -> String {
    let chars: Vec<char> = title.chars().collect();
    let head: String = chars[..CLIP_KEEP].iter().collect();
    let tail: String = chars[chars.len() - CLIP_KEEP..].iter().collect();
    format!("{}{}{}", head, ELLIPSIS, tail)
}

fn is_clipped(title: &str) -> bool {
    let chars: Vec<char> = title.chars().collect();
    chars.len() == CLIP_KEEP * 2 + ELLIPSIS.len()
        && chars[CLIP_KEEP..CLIP_KEEP + ELLIPSIS.len()].iter().all(|&c| c == '.')
}

fn shell_basename(shell: &str) -> &str {
    shell.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(shell)
}

#[cfg(unix)]
fn host_name() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is valid for `buf.len()` bytes and gethostname
    // writes at most that many.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc == 0 {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        if let Ok(name) = std::str::from_utf8(&buf[..end]) {
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    env_host_name()
}

#[cfg(not(unix))]
fn host_name() -> String {
    env_host_name()
}

fn env_host_name() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TitleVars {
        TitleVars {
            bash_name: "zsh".to_string(),
            host_name: "devbox".to_string(),
            platform: "linux".to_string(),
            home: "/home/user".to_string(),
        }
    }

    #[test]
    fn test_default_template() {
        assert_eq!(render_template(DEFAULT_TITLE_TEMPLATE, &vars()), "(zsh)");
    }

    #[test]
    fn test_template_whitespace_and_repeats() {
        let rendered = render_template("{{bashName}}@{{  hostName }} [{{ platform}}] {{bashName}}", &vars());
        assert_eq!(rendered, "zsh@devbox [linux] zsh");
        assert_eq!(render_template("~ is {{ home }}", &vars()), "~ is /home/user");
    }

    #[test]
    fn test_template_unknown_placeholders_stay_literal() {
        assert_eq!(render_template("{{ cwd }} - {{ bashName }}", &vars()), "{{ cwd }} - zsh");
        assert_eq!(render_template("{{ bashName", &vars()), "{{ bashName");
        assert_eq!(render_template("{{ {{ bashName }}", &vars()), "{{ zsh");
        assert_eq!(render_template("no placeholders", &vars()), "no placeholders");
    }

    #[test]
    fn test_shell_basename() {
        assert_eq!(shell_basename("/usr/local/bin/fish"), "fish");
        assert_eq!(shell_basename("bash"), "bash");
        assert_eq!(shell_basename("C:\\Windows\\System32\\cmd.exe"), "cmd.exe");
        assert_eq!(TitleVars::capture("/bin/bash").bash_name, "bash");
    }

    #[test]
    fn test_short_titles_pass_through() {
        assert_eq!(truncate_title_with("vim README.md", '/'), "vim README.md");
        assert_eq!(truncate_title_with("12345678901234567890", '/'), "12345678901234567890");
    }

    #[test]
    fn test_long_path_title_is_clipped() {
        let title = "/home/user/projects/very-long-repo-name/src";
        assert_eq!(truncate_title_with(title, '/'), "/home/user...o-name/src");
    }

    #[test]
    fn test_medium_path_title_is_abbreviated() {
        // 24 characters: short enough to keep the abbreviated form
        let title = "/home/user/work/dotfiles";
        assert_eq!(truncate_title_with(title, '/'), "/home/.../dotfiles");
    }

    #[test]
    fn test_abbreviation_longer_than_limit_is_clipped() {
        // 22 characters, but the abbreviation would be 27
        let title = "abcdefghij/klmnopqrstu";
        assert_eq!(truncate_title_with(title, '/'), "abcdefghij...lmnopqrstu");
    }

    #[test]
    fn test_long_plain_title_is_clipped() {
        let title = "make -j8 all-the-things-please";
        assert_eq!(truncate_title_with(title, '/'), "make -j8 a...ngs-please");
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let title = "日本語のタイトルはとても長いですよねえ本当に";
        let truncated = truncate_title_with(title, '/');
        assert_eq!(truncated.chars().count(), 23);
        assert!(truncated.starts_with("日本語のタイトルはと..."));
    }

    #[test]
    fn test_truncation_converges() {
        let titles = [
            "/home/user/projects/very-long-repo-name/src",
            "/home/user/work/dotfiles",
            "abcdefghij/klmnopqrstu",
            "make -j8 all-the-things-please",
            "/a/b/c/d/e/f/g/h/i/j/k/l/m/n",
            "short",
        ];
        for title in titles {
            let once = truncate_title_with(title, '/');
            let twice = truncate_title_with(&once, '/');
            assert_eq!(once, twice, "{}", title);
        }
    }
}
