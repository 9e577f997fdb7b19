//! File naming conventions for grid maps and their shards.
//!
//! Map files carry their grid size in the name, between dots:
//!
//! ```text
//! maps/canal_street_rain.14x20.jpg           original, 14 columns × 20 rows
//! maps/canal_street_rain.0_120.10x10.14x20.jpg   shard at (0,120), 10 × 10 cells
//! ```
//!
//! Shard paths insert `{x_min}_{y_min}.{cols}x{rows}` right after the first
//! dot-delimited segment of the file name, so the directory and base name
//! survive and the shard's own grid token becomes the first one a parser
//! finds. Distinct `(x_min, y_min, cols, rows)` tuples always give distinct
//! paths.
//!
//! Post titles from the feed carry the grid as a bare `NxM` pair
//! (`"Unmarked Mine [35x49] - Battlemap"`); [`make_nice_filename`] turns such a
//! title into a file name in the convention above.

/// Maximum number of title words kept in a generated file name.
const MAX_NAME_WORDS: usize = 6;

/// Characters kept from the raw title when no usable words are found.
const FALLBACK_NAME_CHARS: usize = 30;

/// Words that never carry meaning in a map name.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "by", "for", "from", "in", "into", "is", "it", "its",
    "my", "of", "oc", "on", "or", "our", "over", "the", "their", "this", "to", "under", "was",
    "with", "your",
];

/// Result of parsing a map file stem like `canal_street.14x20`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMapName {
    /// First dot-delimited segment, underscores preserved.
    pub name: String,
    /// Display title: name with underscores and dashes turned into spaces.
    pub display_title: String,
    /// Grid size from a `.<cols>x<rows>` segment, if present.
    pub grid: Option<(u32, u32)>,
}

/// Parse a file stem (no extension) following the map naming convention.
///
/// - `"canal_street.14x20"` → name `canal_street`, title `canal street`, grid `(14, 20)`
/// - `"gridded-ruined-keep"` → name `gridded-ruined-keep`, title `gridded ruined keep`, no grid
pub fn parse_map_stem(stem: &str) -> ParsedMapName {
    let mut segments = stem.split('.');
    let name = segments.next().unwrap_or_default().to_string();
    let grid = segments.find_map(parse_grid_pair);
    ParsedMapName {
        display_title: name.replace(['_', '-'], " "),
        name,
        grid,
    }
}

/// Grid size from the first `.<cols>x<rows>.` token in a path's file name.
///
/// The token must sit between two dots, so neither the base name nor the
/// extension is ever mistaken for it.
pub fn parse_grid_token(path: &str) -> Option<(u32, u32)> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let segments: Vec<&str> = file_name.split('.').collect();
    if segments.len() < 3 {
        return None;
    }
    segments[1..segments.len() - 1]
        .iter()
        .find_map(|s| parse_grid_pair(s))
}

/// Parse a whole segment of the form `<digits>x<digits>`.
fn parse_grid_pair(segment: &str) -> Option<(u32, u32)> {
    let (cols, rows) = segment.split_once('x')?;
    if !is_digits(cols) || !is_digits(rows) {
        return None;
    }
    Some((cols.parse().ok()?, rows.parse().ok()?))
}

/// First `<digits>x<digits>` pair anywhere in a title.
///
/// `"Old Watermill - Battle Map (30x45)"` → `Some((30, 45))`.
pub fn find_grid_in_title(title: &str) -> Option<(u32, u32)> {
    let bytes = title.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'x' {
            continue;
        }
        let start = bytes[..i]
            .iter()
            .rposition(|c| !c.is_ascii_digit())
            .map_or(0, |p| p + 1);
        let end = bytes[i + 1..]
            .iter()
            .position(|c| !c.is_ascii_digit())
            .map_or(bytes.len(), |p| i + 1 + p);
        if start < i && end > i + 1 {
            let cols = title[start..i].parse().ok()?;
            let rows = title[i + 1..end].parse().ok()?;
            return Some((cols, rows));
        }
    }
    None
}

/// Insert the shard token into a parent path.
///
/// `derive_shard_path("a/b.jpg", 0, 0, 10, 10)` → `"a/b.0_0.10x10.jpg"`.
pub fn derive_shard_path(path: &str, x_min: u32, y_min: u32, cols: u32, rows: u32) -> String {
    let (dir, file_name) = match path.rfind('/') {
        Some(pos) => (&path[..=pos], &path[pos + 1..]),
        None => ("", path),
    };
    let mut segments: Vec<String> = file_name.split('.').map(str::to_string).collect();
    segments.insert(1, format!("{x_min}_{y_min}.{cols}x{rows}"));
    format!("{dir}{}", segments.join("."))
}

/// True when a path's file name carries a shard offset segment
/// (`keep.0_120.10x10.jpg`), i.e. it was produced by [`derive_shard_path`].
pub fn is_shard_path(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let segments: Vec<&str> = file_name.split('.').collect();
    segments.len() >= 3
        && segments[1]
            .split_once('_')
            .is_some_and(|(x, y)| is_digits(x) && is_digits(y))
        && parse_grid_pair(segments[2]).is_some()
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Build a readable file name from a post title.
///
/// Format is `<words>.<cols>x<rows>.jpg`. Words are up to six lowercase
/// alphabetic words that are not stopwords, joined with `_`; when none
/// survive, the first 30 characters of the lowercased title are used instead.
/// Path and shell separators (`/ | ; '`) are stripped. Returns an empty string
/// when the title has no grid size.
pub fn make_nice_filename(title: &str) -> String {
    let Some((cols, rows)) = find_grid_in_title(title) else {
        return String::new();
    };

    let words = title_words(title);
    let name = if words.is_empty() {
        title.to_lowercase().chars().take(FALLBACK_NAME_CHARS).collect()
    } else {
        words
            .into_iter()
            .take(MAX_NAME_WORDS)
            .collect::<Vec<_>>()
            .join("_")
    };
    let name: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '|' | ';' | '\''))
        .collect();

    format!("{name}.{cols}x{rows}.jpg")
}

/// Lowercase words of a title that can name a map.
fn title_words(title: &str) -> Vec<String> {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1 && w.chars().all(char::is_alphabetic))
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // derive_shard_path
    // =========================================================================

    #[test]
    fn shard_path_inserts_token_before_extension() {
        let p = derive_shard_path("a/b.jpg", 0, 0, 10, 10);
        assert!(p.contains("0_0.10x10"));
        assert!(p.ends_with(".jpg"));
        assert_eq!(p, "a/b.0_0.10x10.jpg");
    }

    #[test]
    fn shard_path_keeps_parent_grid_token() {
        let p = derive_shard_path("maps/canal.14x20.jpg", 120, 40, 10, 10);
        assert_eq!(p, "maps/canal.120_40.10x10.14x20.jpg");
        assert_eq!(parse_grid_token(&p), Some((10, 10)));
    }

    #[test]
    fn shard_path_ignores_dots_in_directories() {
        let p = derive_shard_path("/tmp/run.1/keep.jpg", 32, 64, 5, 5);
        assert_eq!(p, "/tmp/run.1/keep.32_64.5x5.jpg");
    }

    #[test]
    fn shard_path_without_directory_or_extension() {
        assert_eq!(derive_shard_path("keep", 1, 2, 3, 4), "keep.1_2.3x4");
    }

    #[test]
    fn shard_paths_distinct_for_distinct_tuples() {
        let tuples = [
            (0, 0, 10, 10),
            (0, 0, 10, 11),
            (0, 0, 11, 10),
            (0, 1, 10, 10),
            (1, 0, 10, 10),
            (10, 0, 1, 10),
            (1, 0, 0, 10),
        ];
        let mut seen = std::collections::HashSet::new();
        for &(x, y, c, r) in &tuples {
            assert!(seen.insert(derive_shard_path("a/b.jpg", x, y, c, r)));
        }
    }

    #[test]
    fn shard_paths_are_recognized() {
        let shard = derive_shard_path("maps/canal.14x20.jpg", 120, 40, 10, 10);
        assert!(is_shard_path(&shard));
        assert!(!is_shard_path("maps/canal.14x20.jpg"));
        assert!(!is_shard_path("maps/old_mill.jpg"));
        assert!(!is_shard_path("maps/v1_2.14x20.jpg"));
    }

    // =========================================================================
    // Grid parsing
    // =========================================================================

    #[test]
    fn grid_token_from_path() {
        assert_eq!(
            parse_grid_token("reddit_maps_data/canal_street_rain.14x20.jpg"),
            Some((14, 20))
        );
    }

    #[test]
    fn grid_token_requires_surrounding_dots() {
        assert_eq!(parse_grid_token("maps/14x20.jpg"), None);
        assert_eq!(parse_grid_token("maps/keep.14x20"), None);
        assert_eq!(parse_grid_token("maps/keep.jpg"), None);
    }

    #[test]
    fn grid_token_rejects_partial_digits() {
        assert_eq!(parse_grid_token("maps/keep.14x20b.jpg"), None);
        assert_eq!(parse_grid_token("maps/keep.x20.jpg"), None);
    }

    #[test]
    fn grid_in_title_variants() {
        assert_eq!(
            find_grid_in_title("Unmarked Mine [35x49] - Battlemap/ Dungeon\t"),
            Some((35, 49))
        );
        assert_eq!(
            find_grid_in_title("Old Watermill - Battle Map (30x45)"),
            Some((30, 45))
        );
        assert_eq!(find_grid_in_title("12x34x56"), Some((12, 34)));
        assert_eq!(find_grid_in_title("Box x marks 5x"), None);
        assert_eq!(find_grid_in_title("No grid here"), None);
    }

    #[test]
    fn parse_map_stem_with_grid() {
        let p = parse_map_stem("canal_street.14x20");
        assert_eq!(p.name, "canal_street");
        assert_eq!(p.display_title, "canal street");
        assert_eq!(p.grid, Some((14, 20)));
    }

    #[test]
    fn parse_map_stem_without_grid() {
        let p = parse_map_stem("gridded-ruined-keep");
        assert_eq!(p.display_title, "gridded ruined keep");
        assert_eq!(p.grid, None);
    }

    // =========================================================================
    // make_nice_filename
    // =========================================================================

    #[test]
    fn nice_filename_from_title() {
        let name = make_nice_filename("Unmarked Mine [35x49] - Battlemap/ Dungeon\t");
        assert_eq!(name, "unmarked_mine_battlemap_dungeon.35x49.jpg");
        assert!(!name.contains('/'));
    }

    #[test]
    fn nice_filename_drops_stopwords_and_caps_words() {
        let name = make_nice_filename(
            "[OC] The Inn Beyond Worlds of the Lost Crystal Caverns - [50x50]",
        );
        assert_eq!(name, "inn_beyond_worlds_lost_crystal_caverns.50x50.jpg");
    }

    #[test]
    fn nice_filename_falls_back_to_raw_title() {
        assert_eq!(make_nice_filename("22x30"), "22x30.22x30.jpg");
    }

    #[test]
    fn nice_filename_strips_separators_in_fallback() {
        let name = make_nice_filename("1/2;3 40x40");
        assert_eq!(name, "123 40x40.40x40.jpg");
    }

    #[test]
    fn nice_filename_empty_without_grid() {
        assert_eq!(make_nice_filename("A lovely tavern"), "");
    }
}
