use anyhow::{bail, Context, Result};
use clap::{builder::styling, Parser};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::dispatch::{self, Dispatcher};
use crate::face::FontFace;
use crate::fitter::SkyLineFitter;
use crate::range::GlyphRange;
use crate::skyline::SkyLine;
use crate::storage::GlyphStorage;
use crate::xml::{Coordinates, XmlWriter};

/// Widest atlas page the fitter will consider.
const MAX_PAGE_SIZE: u32 = 2048;

/// Named segments enabled when neither --all nor --empty is given.
const ENABLED_BY_DEFAULT: [&str; 7] = [
    "default",
    "ascii",
    "latin",
    "greek",
    "cyrillic",
    "hiragana",
    "katakana",
];

const LONG_ABOUT: &str = "\
Compile outline fonts into a precalculated signed-distance-field texture \
usable with the Valve alpha-test rendering algorithm.

The font files given on the command line are iterated in the order \
specified: every glyph is extracted from the first font file that contains \
it, successive font files serve as fallbacks.";

const AFTER_HELP: &str = "\
Segment names are:
  ascii
  cyrillic
  default
  greek
  hangul
  hiragana
  katakana
  latin
  unified-ideograms

'default' covers common shapes that are hard to classify into any specific
segment, but are commonly used anyway.";

#[derive(Parser)]
#[command(name = "emboss")]
#[command(about = "Compile outline fonts into a signed-distance-field glyph atlas")]
#[command(long_about = LONG_ABOUT)]
#[command(after_help = AFTER_HELP)]
#[command(version = env!("EMBOSS_VERSION"))]
#[command(long_version = env!("EMBOSS_VERSION"))]
#[command(
    styles = styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(styling::AnsiColor::Cyan.on_default() | styling::Effects::BOLD)
        .placeholder(styling::AnsiColor::Cyan.on_default())
)]
pub struct CompileArgs {
    /// Font input files; the first font containing a glyph wins
    #[arg(value_name = "FONTS")]
    pub fonts: Vec<PathBuf>,

    /// Font input file (same as a positional argument)
    #[arg(short = 'f', long = "font", value_name = "FILE")]
    pub font: Vec<PathBuf>,

    /// Output basename for <BASE>.xml and <BASE>_<n>.png
    #[arg(short, long, value_name = "BASE")]
    pub outfile: Option<String>,

    /// Pixel size of glyphs used for the distance calculation
    #[arg(short, long, default_value_t = 2048, value_name = "SIZE")]
    pub precalc_size: u32,

    /// Target resolution to crunch glyphs to (tile half-extent)
    #[arg(short, long, default_value_t = 48, value_name = "SIZE")]
    pub target_size: u32,

    /// Relative distance (of whole glyph) of the font edge it takes to
    /// reduce the alpha test to 0
    #[arg(short, long, default_value_t = 0.1, value_name = "FRACTION")]
    pub dropdown: f32,

    /// System to store texture coordinates in
    #[arg(short, long, value_enum, default_value = "opengl")]
    pub coordinates: Coordinates,

    /// Include a segment: a symbolic name, an individual unicode number or
    /// a N:M unicode range; may be repeated
    #[arg(short, long, value_name = "SEGMENT")]
    pub include: Vec<String>,

    /// Deny a segment from being included, same forms as --include; may be
    /// repeated
    #[arg(short, long, value_name = "SEGMENT")]
    pub revoke: Vec<String>,

    /// Add an ad-hoc glyph range (N:M) or an individual glyph (N)
    #[arg(long, value_name = "RANGE")]
    pub custom_range: Vec<String>,

    /// Enable all known named segments by default
    #[arg(short, long)]
    pub all: bool,

    /// Do not enable any segments by default
    #[arg(short, long)]
    pub empty: bool,

    /// Progress reporting and per-glyph renderings
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run(args: CompileArgs) -> bool {
    match run_impl(args) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("[emboss] ERROR: {e:#}");
            false
        }
    }
}

fn run_impl(args: CompileArgs) -> Result<()> {
    if args.precalc_size == 0 {
        bail!("invalid precalculation size {}", args.precalc_size);
    }
    if args.target_size == 0 {
        bail!("invalid crunch size {}", args.target_size);
    }
    if args.dropdown <= 0.0 || args.dropdown >= 1.0 {
        bail!(
            "invalid dropdown {}, expected a fraction inside (0, 1)",
            args.dropdown
        );
    }

    let outfile = match args.outfile.as_deref() {
        Some(base) if !base.is_empty() => base,
        _ => bail!("output files not specified"),
    };

    let mut fonts = args.fonts.clone();
    fonts.extend(args.font.iter().cloned());
    if fonts.is_empty() {
        bail!("no font files specified");
    }

    let ranges = configure_ranges(
        args.all,
        args.empty,
        &args.include,
        &args.revoke,
        &args.custom_range,
    )?;

    let mut faces = Vec::with_capacity(fonts.len());
    for path in &fonts {
        faces.push(FontFace::open(path, args.precalc_size, args.dropdown)?);
    }

    if args.verbose {
        let mut selected: Vec<u32> = ranges
            .values()
            .filter(|range| range.is_enabled())
            .flat_map(|range| range.codes().iter().copied())
            .collect();
        selected.sort_unstable();
        selected.dedup();

        println!("[emboss] Using output file base: {outfile}");
        println!("[emboss] Selected {} code points", selected.len());
        println!("[emboss] Rendering:");
    }

    // All rendering happens here on the producer side; the pool only ever
    // sees crunch work and fitting attempts.
    let storage = Arc::new(GlyphStorage::new(args.verbose));
    let dispatcher = Dispatcher::new(dispatch::hardware_concurrency());

    let mut dispatched = 0;
    for range in ranges.values() {
        dispatched += range.queue(&storage, &dispatcher, &faces, args.target_size);
    }
    dispatcher.wait();

    if args.verbose {
        println!(
            "\n[emboss] Rendered {dispatched} glyphs, {} missing",
            storage.missing_count()
        );
    }

    storage.sort();

    let xml_path = PathBuf::from(format!("{outfile}.xml"));
    let mut xml = XmlWriter::create(&xml_path)?;

    let mut image_index: u32 = 0;
    while !storage.is_empty() {
        if args.verbose {
            println!(
                "\n[emboss] {} fitting process: {} glyphs left",
                if image_index == 0 { "Start" } else { "Continue" },
                storage.len()
            );
        }

        let fitter = Arc::new(SkyLineFitter::new(MAX_PAGE_SIZE, args.verbose));
        fitter.queue(&dispatcher, &storage);
        dispatcher.wait();

        let (width, height) = fitter.best_size();
        if width == 0 || height == 0 {
            bail!(
                "no {MAX_PAGE_SIZE}x{MAX_PAGE_SIZE} page can take the remaining {} glyphs",
                storage.len()
            );
        }

        let mut skyline = SkyLine::new(width, height);
        let placed = {
            let mut glyphs = storage.glyphs_mut();
            skyline.fit_all(&mut glyphs, image_index, &mut xml, args.coordinates)?
        };
        if placed == 0 {
            bail!("fitting made no progress: a glyph does not fit a {width}x{height} page");
        }

        storage.trim();

        let png_path = PathBuf::from(format!("{outfile}_{image_index}.png"));
        let png_name = png_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .context("invalid output basename")?;

        xml.write_texture(&png_name)?;
        skyline.save(&png_path)?;

        image_index += 1;
    }

    xml.finish()?;

    if args.verbose {
        println!("\n[emboss] Done.");
        std::io::stdout().flush().ok();
    }
    Ok(())
}

fn named_segments() -> BTreeMap<String, GlyphRange> {
    let mut ranges = BTreeMap::new();

    // Common shapes that belong to no particular script: ellipsis, black
    // square, white vertical rectangle.
    let mut default_range = GlyphRange::new();
    default_range.add(0x2026);
    default_range.add(0x25A0);
    default_range.add(0x25AF);
    ranges.insert("default".to_string(), default_range);

    ranges.insert("ascii".to_string(), GlyphRange::span(0x20, 0x7E));
    ranges.insert("latin".to_string(), GlyphRange::span(0xC0, 0xFF));
    ranges.insert("greek".to_string(), GlyphRange::span(0x370, 0x3FF));
    ranges.insert("cyrillic".to_string(), GlyphRange::span(0x410, 0x44F));
    ranges.insert("hiragana".to_string(), GlyphRange::span(0x3040, 0x309E));
    ranges.insert("katakana".to_string(), GlyphRange::span(0x30A0, 0x30FE));
    ranges.insert(
        "unified-ideograms".to_string(),
        GlyphRange::span(0x4E00, 0x9FA5),
    );
    ranges.insert("hangul".to_string(), GlyphRange::span(0xAC00, 0xD7AF));

    ranges
}

/// `N:M` or a single `N`, decimal.
fn parse_span(text: &str) -> Option<(u32, u32)> {
    match text.split_once(':') {
        Some((start, end)) => Some((start.trim().parse().ok()?, end.trim().parse().ok()?)),
        None => {
            let code = text.trim().parse().ok()?;
            Some((code, code))
        }
    }
}

/// Build the effective segment map from the command line. Includes run
/// first, then ad-hoc ranges, and revokes override everything; numeric
/// revokes strip the code points out of every range including the extra
/// bucket.
fn configure_ranges(
    all: bool,
    empty: bool,
    include: &[String],
    revoke: &[String],
    custom: &[String],
) -> Result<BTreeMap<String, GlyphRange>> {
    if all && empty {
        bail!("both --all and --empty specified at the same time");
    }

    let mut ranges = named_segments();
    let mut extra = GlyphRange::new();

    for name in ENABLED_BY_DEFAULT {
        ranges
            .get_mut(name)
            .expect("default segment must be a named segment")
            .enable();
    }

    if all {
        for range in ranges.values_mut() {
            range.enable();
        }
    } else if empty {
        for range in ranges.values_mut() {
            range.disable();
        }
    }

    for segment in include {
        if let Some(range) = ranges.get_mut(segment.as_str()) {
            range.enable();
        } else if let Some((start, end)) = parse_span(segment) {
            extra.add_span(start, end);
            extra.enable();
        } else {
            bail!("invalid range description: '{segment}'");
        }
    }

    for segment in custom {
        let Some((start, end)) = parse_span(segment) else {
            bail!("invalid range description: '{segment}'");
        };
        extra.add_span(start, end);
        extra.enable();
    }

    for segment in revoke {
        if let Some(range) = ranges.get_mut(segment.as_str()) {
            range.disable();
        } else if let Some((start, end)) = parse_span(segment) {
            if start == end {
                for range in ranges.values_mut() {
                    range.remove(start);
                }
                extra.remove(start);
            } else {
                for range in ranges.values_mut() {
                    range.remove_span(start, end);
                }
                extra.remove_span(start, end);
            }
        } else {
            bail!("invalid range description: '{segment}'");
        }
    }

    if extra.is_enabled() {
        ranges.insert("extra".to_string(), extra);
    }

    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_codes(ranges: &BTreeMap<String, GlyphRange>) -> Vec<u32> {
        let mut codes: Vec<u32> = ranges
            .values()
            .filter(|range| range.is_enabled())
            .flat_map(|range| range.codes().iter().copied())
            .collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }

    #[test]
    fn parse_span_accepts_numbers_and_ranges() {
        assert_eq!(parse_span("65"), Some((65, 65)));
        assert_eq!(parse_span("65:90"), Some((65, 90)));
        assert_eq!(parse_span(" 9731 : 9731 "), Some((9731, 9731)));
        assert_eq!(parse_span("ascii"), None);
        assert_eq!(parse_span("65:"), None);
        assert_eq!(parse_span(""), None);
    }

    #[test]
    fn default_configuration_enables_the_common_segments() {
        let ranges = configure_ranges(false, false, &[], &[], &[]).unwrap();
        for name in ENABLED_BY_DEFAULT {
            assert!(ranges[name].is_enabled(), "{name} should be enabled");
        }
        assert!(!ranges["hangul"].is_enabled());
        assert!(!ranges["unified-ideograms"].is_enabled());
        assert!(!ranges.contains_key("extra"));
    }

    #[test]
    fn empty_with_include_selects_a_single_segment() {
        let include = vec!["ascii".to_string()];
        let ranges = configure_ranges(false, true, &include, &[], &[]).unwrap();
        let codes = enabled_codes(&ranges);
        assert_eq!(codes.len(), 95);
        assert_eq!(codes.first(), Some(&0x20));
        assert_eq!(codes.last(), Some(&0x7E));
    }

    #[test]
    fn revoke_span_strips_code_points_from_named_segments() {
        let include = vec!["ascii".to_string()];
        let revoke = vec!["65:90".to_string()];
        let ranges = configure_ranges(false, true, &include, &revoke, &[]).unwrap();
        let codes = enabled_codes(&ranges);
        assert_eq!(codes.len(), 95 - 26);
        assert!(codes.iter().all(|code| !(65..=90).contains(code)));
    }

    #[test]
    fn revoke_single_code_point() {
        let include = vec!["ascii".to_string()];
        let revoke = vec!["65".to_string()];
        let ranges = configure_ranges(false, true, &include, &revoke, &[]).unwrap();
        let codes = enabled_codes(&ranges);
        assert_eq!(codes.len(), 94);
        assert!(!codes.contains(&65));
    }

    #[test]
    fn revoke_by_name_disables_the_segment() {
        let revoke = vec!["latin".to_string()];
        let ranges = configure_ranges(false, false, &[], &revoke, &[]).unwrap();
        assert!(!ranges["latin"].is_enabled());
        assert!(ranges["ascii"].is_enabled());
    }

    #[test]
    fn numeric_include_lands_in_the_extra_bucket() {
        let include = vec!["9731".to_string()];
        let ranges = configure_ranges(false, true, &include, &[], &[]).unwrap();
        assert!(ranges["extra"].is_enabled());
        assert_eq!(ranges["extra"].codes(), &[9731]);
    }

    #[test]
    fn custom_range_feeds_the_extra_bucket() {
        let custom = vec!["9731:9733".to_string()];
        let ranges = configure_ranges(false, true, &[], &[], &custom).unwrap();
        assert_eq!(ranges["extra"].codes(), &[9731, 9732, 9733]);
    }

    #[test]
    fn revoke_also_strips_the_extra_bucket() {
        let custom = vec!["100:110".to_string()];
        let revoke = vec!["105:120".to_string()];
        let ranges = configure_ranges(false, true, &[], &revoke, &custom).unwrap();
        assert_eq!(ranges["extra"].codes(), &[100, 101, 102, 103, 104]);
    }

    #[test]
    fn all_and_empty_conflict() {
        assert!(configure_ranges(true, true, &[], &[], &[]).is_err());
    }

    #[test]
    fn all_enables_every_named_segment() {
        let ranges = configure_ranges(true, false, &[], &[], &[]).unwrap();
        assert!(ranges.values().all(GlyphRange::is_enabled));
    }

    #[test]
    fn bad_segment_descriptions_are_rejected() {
        let include = vec!["no-such-segment".to_string()];
        assert!(configure_ranges(false, false, &include, &[], &[]).is_err());

        let revoke = vec!["also-bogus".to_string()];
        assert!(configure_ranges(false, false, &[], &revoke, &[]).is_err());
    }

    #[test]
    fn named_segments_cover_the_documented_set() {
        let ranges = named_segments();
        let names: Vec<&str> = ranges.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "ascii",
                "cyrillic",
                "default",
                "greek",
                "hangul",
                "hiragana",
                "katakana",
                "latin",
                "unified-ideograms",
            ]
        );
        assert_eq!(ranges["default"].codes(), &[0x2026, 0x25A0, 0x25AF]);
        assert_eq!(ranges["ascii"].codes().len(), 95);
    }
}
