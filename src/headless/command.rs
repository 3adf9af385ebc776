//! Stdin command parsing
//!
//! One command per line. Batch commands take an optional trailing target
//! list (`0,2`); without it every discovered ESC is addressed.

use std::path::PathBuf;

use escfg_app::Request;
use escfg_core::MelodyModel;

/// A parsed stdin line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Forward to the engine as-is
    Request(Request),
    /// Read the image from disk, then flash it
    FlashFile {
        path: PathBuf,
        targets: Option<Vec<u8>>,
    },
    Status,
    Quit,
}

/// Parse one line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match verb {
        "ports" => Command::Request(Request::RefreshPorts),
        "select" => Command::Request(Request::SelectPort(number(&args, 0, "port index")?)),
        "baud" => Command::Request(Request::SetBaudRate(number(&args, 0, "baud rate")?)),
        "connect" => Command::Request(Request::Connect),
        "disconnect" => Command::Request(Request::Disconnect),
        "read" => Command::Request(Request::ReadSettings {
            targets: targets(args.first().copied())?,
        }),
        "write" => Command::Request(Request::WriteSettings {
            settings: hex_bytes(required(&args, 0, "settings bytes")?)?,
            targets: targets(args.get(1).copied())?,
        }),
        "defaults" => Command::Request(Request::WriteDefaults {
            targets: targets(args.first().copied())?,
        }),
        "flash-file" => Command::FlashFile {
            path: PathBuf::from(required(&args, 0, "firmware path")?),
            targets: targets(args.get(1).copied())?,
        },
        "flash-url" => Command::Request(Request::FlashFromUrl {
            url: required(&args, 0, "firmware URL")?.to_string(),
            targets: targets(args.get(1).copied())?,
        }),
        "dump" => Command::Request(Request::DumpFirmware {
            device: number(&args, 0, "device index")?,
        }),
        "motors" => Command::Request(Request::RunAllMotors {
            speed: number(&args, 0, "speed")?,
        }),
        "motor" => Command::Request(Request::RunSingleMotor {
            device: number(&args, 0, "device index")?,
            speed: number(&args, 1, "speed")?,
        }),
        "melody" => parse_melody(&args)?,
        "status" => Command::Status,
        "q" | "quit" => Command::Quit,
        other => return Err(format!("unknown command: {}", other)),
    };
    Ok(Some(command))
}

fn parse_melody(args: &[&str]) -> Result<Command, String> {
    let request = match required(args, 0, "melody action")? {
        "show" => Request::ShowMelodyEditor,
        "hide" => Request::HideMelodyEditor,
        "edit" => Request::EditMelody(tune(&args[1..])),
        "commit" => Request::CommitMelody(tune(&args[1..])),
        other => return Err(format!("unknown melody action: {}", other)),
    };
    Ok(Command::Request(request))
}

/// One synchronised track from the rest of the line.
fn tune(words: &[&str]) -> MelodyModel {
    MelodyModel {
        tracks: vec![words.join(" ")],
        synchronized: true,
    }
}

fn required<'a>(args: &[&'a str], index: usize, what: &str) -> Result<&'a str, String> {
    args.get(index)
        .copied()
        .ok_or_else(|| format!("missing {}", what))
}

fn number<T: std::str::FromStr>(args: &[&str], index: usize, what: &str) -> Result<T, String> {
    let raw = required(args, index, what)?;
    raw.parse()
        .map_err(|_| format!("invalid {}: {}", what, raw))
}

fn targets(raw: Option<&str>) -> Result<Option<Vec<u8>>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<u8>()
                .map_err(|_| format!("invalid target: {}", part))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn hex_bytes(raw: &str) -> Result<Vec<u8>, String> {
    if raw.len() % 2 != 0 {
        return Err(format!("odd number of hex digits: {}", raw));
    }
    (0..raw.len())
        .step_by(2)
        .map(|i| {
            raw.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex byte in: {}", raw))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        parse_command(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_line_is_ignored() {
        assert_eq!(parse_command("   ").unwrap(), None);
    }

    #[test]
    fn test_link_commands() {
        assert_eq!(parse("ports"), Command::Request(Request::RefreshPorts));
        assert_eq!(parse("select 1"), Command::Request(Request::SelectPort(1)));
        assert_eq!(
            parse("baud 19200"),
            Command::Request(Request::SetBaudRate(19200))
        );
        assert_eq!(parse("connect"), Command::Request(Request::Connect));
        assert_eq!(parse("q"), Command::Quit);
    }

    #[test]
    fn test_batch_targets_are_optional() {
        assert_eq!(
            parse("read"),
            Command::Request(Request::ReadSettings { targets: None })
        );
        assert_eq!(
            parse("defaults 0,2"),
            Command::Request(Request::WriteDefaults {
                targets: Some(vec![0, 2])
            })
        );
    }

    #[test]
    fn test_write_parses_hex_settings() {
        assert_eq!(
            parse("write 01ff 3"),
            Command::Request(Request::WriteSettings {
                targets: Some(vec![3]),
                settings: vec![0x01, 0xff],
            })
        );
        assert!(parse_command("write 0").is_err());
        assert!(parse_command("write zz").is_err());
    }

    #[test]
    fn test_flash_file_keeps_path() {
        assert_eq!(
            parse("flash-file fw/blheli.hex"),
            Command::FlashFile {
                path: PathBuf::from("fw/blheli.hex"),
                targets: None,
            }
        );
    }

    #[test]
    fn test_motor_commands() {
        assert_eq!(
            parse("motor 2 1200"),
            Command::Request(Request::RunSingleMotor {
                device: 2,
                speed: 1200
            })
        );
        assert!(parse_command("motor 2").is_err());
        assert!(parse_command("motors fast").is_err());
    }

    #[test]
    fn test_melody_commit_joins_tune() {
        match parse("melody commit Bach:d=4,o=5,b=120:c,e") {
            Command::Request(Request::CommitMelody(model)) => {
                assert_eq!(model.tracks, vec!["Bach:d=4,o=5,b=120:c,e".to_string()]);
                assert!(model.synchronized);
            }
            other => panic!("expected melody commit, got {other:?}"),
        }
        assert!(matches!(
            parse("melody edit Bach:d=4,o=5,b=120:c"),
            Command::Request(Request::EditMelody(_))
        ));
        assert_eq!(
            parse("melody show"),
            Command::Request(Request::ShowMelodyEditor)
        );
        assert!(parse_command("melody play").is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_command("reboot").unwrap_err(),
            "unknown command: reboot"
        );
    }
}
