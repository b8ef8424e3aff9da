//! Command-line surface for the `gpsdecode` binary, built with `clap`'s
//! `Command` builder (matching the teacher's `cli.rs` rather than the
//! derive macros) since the flag set here is small and flat.

use clap::{value_parser, Arg, ArgAction, Command};

pub fn build() -> Command {
    Command::new("gpsdecode")
        .about("Decode GPS/GNSS wire protocol logs into JSON")
        .arg(
            Arg::new("ais")
                .long("ais")
                .short('a')
                .help("Decode AIVDM payloads in addition to position fixes")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("decode")
                .long("decode")
                .short('d')
                .help("Decode binary packets to JSON (default mode)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("encode")
                .long("encode")
                .short('e')
                .help("Encode JSON records back to binary packets")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .short('j')
                .help("Emit newline-delimited JSON records")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("nmea")
                .long("nmea")
                .short('n')
                .help("Re-emit NMEA sentences instead of JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("split24")
                .long("split24")
                .short('s')
                .help("Split AIS type 24 part A/B pairs into separate records")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("spartn")
                .long("spartn")
                .help("Enable SPARTN framing recognition (off by default)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("minlength")
                .long("minlength")
                .short('l')
                .help("Discard packets shorter than this many bytes")
                .value_parser(value_parser!(usize))
                .default_value("0"),
        )
        .arg(
            Arg::new("types")
                .long("types")
                .short('t')
                .help("Comma-separated list of packet types to pass through")
                .value_delimiter(','),
        )
        .arg(
            Arg::new("unscaled")
                .long("unscaled")
                .short('u')
                .help("Emit raw integer fields instead of scaled floats")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Increase log verbosity (repeatable)")
                .action(ArgAction::Count),
        )
        .arg(Arg::new("input").help("Input log file, or '-' for stdin").default_value("-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_invocation_parses() {
        let m = build().try_get_matches_from(["gpsdecode"]).unwrap();
        assert_eq!(m.get_one::<String>("input").map(String::as_str), Some("-"));
        assert_eq!(*m.get_one::<usize>("minlength").unwrap(), 0);
    }

    #[test]
    fn flags_and_types_list_parse() {
        let m = build()
            .try_get_matches_from(["gpsdecode", "--ais", "--types", "NMEA,UBX", "in.log"])
            .unwrap();
        assert!(m.get_flag("ais"));
        let types: Vec<&String> = m.get_many::<String>("types").unwrap().collect();
        assert_eq!(types, vec!["NMEA", "UBX"]);
        assert_eq!(m.get_one::<String>("input").map(String::as_str), Some("in.log"));
    }

    #[test]
    fn verbose_is_repeatable_count() {
        let m = build().try_get_matches_from(["gpsdecode", "-vvv"]).unwrap();
        assert_eq!(*m.get_one::<u8>("verbose").unwrap(), 3);
    }
}
