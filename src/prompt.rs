//! Interactive terminal collaborators: album selection and manual matching.

use std::io::{self, BufRead, Write};

use crate::providers::AlbumCandidate;
use crate::reconcile::{LocalFile, ManualDecision, TracklistEntry};

/// The user's side of a run: album choice and files the automatic pass
/// could not match.
pub trait ManualResolver {
    /// Index into `candidates`, or `None` to abort.
    fn choose_album(&mut self, candidates: &[AlbumCandidate]) -> Result<Option<usize>, String>;

    /// `entries` are the still-unassigned tracklist entries.
    fn resolve(
        &mut self,
        files: &[LocalFile],
        entries: &[TracklistEntry],
    ) -> Result<Vec<ManualDecision>, String>;
}

fn io_error(err: io::Error) -> String {
    format!("terminal I/O failed: {err}")
}

/// Reads one trimmed line; `None` on end of input.
fn read_answer<R: BufRead>(input: &mut R) -> Result<Option<String>, String> {
    let mut line = String::new();
    let read = input.read_line(&mut line).map_err(io_error)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<Option<String>, String> {
    write!(output, "{question}").map_err(io_error)?;
    output.flush().map_err(io_error)?;
    read_answer(input)
}

/// Lets the user confirm or pick an album. `None` means abort.
pub fn select_album<R: BufRead, W: Write>(
    candidates: &[AlbumCandidate],
    input: &mut R,
    output: &mut W,
) -> Result<Option<usize>, String> {
    match candidates {
        [] => Ok(None),
        [only] => {
            writeln!(output, "Found: {} by {}", only.title, only.artist).map_err(io_error)?;
            let Some(answer) = ask(input, output, "Is this correct? [Y/n] ")? else {
                return Ok(None);
            };
            let accepted = answer.is_empty()
                || answer.eq_ignore_ascii_case("y")
                || answer.eq_ignore_ascii_case("yes");
            Ok(accepted.then_some(0))
        }
        _ => {
            writeln!(output, "Multiple albums found:").map_err(io_error)?;
            for (index, candidate) in candidates.iter().enumerate() {
                writeln!(
                    output,
                    "  [{}] {} by {}",
                    index + 1,
                    candidate.title,
                    candidate.artist
                )
                .map_err(io_error)?;
            }
            let question = format!("Select album (1-{}, anything else aborts): ", candidates.len());
            let Some(answer) = ask(input, output, &question)? else {
                return Ok(None);
            };
            Ok(answer
                .parse::<usize>()
                .ok()
                .filter(|choice| (1..=candidates.len()).contains(choice))
                .map(|choice| choice - 1))
        }
    }
}

fn describe_entry(index: usize, entry: &TracklistEntry) -> String {
    match &entry.artist {
        Some(artist) => format!("  [{}] {}. {} ({})", index + 1, entry.position, entry.title, artist),
        None => format!("  [{}] {}. {}", index + 1, entry.position, entry.title),
    }
}

/// Asks, for each file, which remaining entry it is. A chosen entry is no
/// longer offered. End of input skips the remaining files.
pub fn prompt_manual_matches<R: BufRead, W: Write>(
    files: &[LocalFile],
    entries: &[TracklistEntry],
    input: &mut R,
    output: &mut W,
) -> Result<Vec<ManualDecision>, String> {
    let mut available: Vec<&TracklistEntry> = entries.iter().collect();
    let mut decisions = Vec::with_capacity(files.len());
    let mut input_closed = false;

    for file in files {
        let skip = ManualDecision::Skip {
            file: file.path.clone(),
        };
        if input_closed || available.is_empty() {
            decisions.push(skip);
            continue;
        }

        writeln!(output, "\nNo confident match for: {}", file.file_name()).map_err(io_error)?;
        for (index, entry) in available.iter().enumerate() {
            writeln!(output, "{}", describe_entry(index, entry)).map_err(io_error)?;
        }

        loop {
            let question = format!("Track for this file (1-{}, s to skip): ", available.len());
            let Some(answer) = ask(input, output, &question)? else {
                input_closed = true;
                decisions.push(skip.clone());
                break;
            };
            if answer.eq_ignore_ascii_case("s") {
                decisions.push(skip.clone());
                break;
            }
            match answer
                .parse::<usize>()
                .ok()
                .filter(|choice| (1..=available.len()).contains(choice))
            {
                Some(choice) => {
                    let entry = available.remove(choice - 1);
                    decisions.push(ManualDecision::Assign {
                        file: file.path.clone(),
                        entry_position: entry.position,
                    });
                    break;
                }
                None => writeln!(output, "Invalid choice '{answer}'.").map_err(io_error)?,
            }
        }
    }
    Ok(decisions)
}

/// `ManualResolver` over a terminal or any reader/writer pair.
pub struct TerminalResolver<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalResolver<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl TerminalResolver<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ManualResolver for TerminalResolver<R, W> {
    fn choose_album(&mut self, candidates: &[AlbumCandidate]) -> Result<Option<usize>, String> {
        select_album(candidates, &mut self.input, &mut self.output)
    }

    fn resolve(
        &mut self,
        files: &[LocalFile],
        entries: &[TracklistEntry],
    ) -> Result<Vec<ManualDecision>, String> {
        prompt_manual_matches(files, entries, &mut self.input, &mut self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::{prompt_manual_matches, select_album, ManualResolver, TerminalResolver};
    use crate::providers::AlbumCandidate;
    use crate::reconcile::{LocalFile, ManualDecision, TracklistEntry};
    use std::io::Cursor;
    use std::path::PathBuf;

    fn candidate(id: u64, title: &str) -> AlbumCandidate {
        AlbumCandidate {
            id,
            title: title.to_string(),
            artist: "AllttA".to_string(),
            cover_url: None,
            url: None,
        }
    }

    fn run_select(candidates: &[AlbumCandidate], answers: &str) -> Option<usize> {
        let mut output = Vec::new();
        select_album(candidates, &mut Cursor::new(answers), &mut output).unwrap()
    }

    #[test]
    fn test_select_album_single_candidate_defaults_to_yes() {
        let candidates = [candidate(1, "The Upper Hand")];
        assert_eq!(run_select(&candidates, "\n"), Some(0));
        assert_eq!(run_select(&candidates, "y\n"), Some(0));
        assert_eq!(run_select(&candidates, "n\n"), None);
        assert_eq!(run_select(&candidates, ""), None);
    }

    #[test]
    fn test_select_album_from_list() {
        let candidates = [candidate(1, "A"), candidate(2, "B"), candidate(3, "C")];
        assert_eq!(run_select(&candidates, "2\n"), Some(1));
        assert_eq!(run_select(&candidates, "4\n"), None);
        assert_eq!(run_select(&candidates, "q\n"), None);
        assert_eq!(run_select(&[], "1\n"), None);
    }

    #[test]
    fn test_select_album_prints_prompt() {
        let mut output = Vec::new();
        select_album(
            &[candidate(1, "The Upper Hand")],
            &mut Cursor::new("\n"),
            &mut output,
        )
        .unwrap();
        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("The Upper Hand by AllttA"));
        assert!(printed.contains("Is this correct? [Y/n]"));
    }

    fn files(names: &[&str]) -> Vec<LocalFile> {
        names.iter().map(|name| LocalFile::from_path(*name)).collect()
    }

    #[test]
    fn test_prompt_manual_matches_reprompts_and_removes_chosen_entries() {
        let files = files(&["/music/x.mp3", "/music/y.mp3", "/music/z.mp3"]);
        let entries = vec![
            TracklistEntry::new(3, "Three"),
            TracklistEntry::new(5, "Five"),
        ];
        let mut output = Vec::new();
        let decisions = prompt_manual_matches(
            &files,
            &entries,
            &mut Cursor::new("9\nabc\n2\ns\n1\n"),
            &mut output,
        )
        .unwrap();

        assert_eq!(
            decisions,
            vec![
                ManualDecision::Assign {
                    file: PathBuf::from("/music/x.mp3"),
                    entry_position: 5
                },
                ManualDecision::Skip {
                    file: PathBuf::from("/music/y.mp3")
                },
                ManualDecision::Assign {
                    file: PathBuf::from("/music/z.mp3"),
                    entry_position: 3
                },
            ]
        );
        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("Invalid choice '9'."));
        assert!(printed.contains("Invalid choice 'abc'."));
    }

    #[test]
    fn test_prompt_manual_matches_end_of_input_skips_rest() {
        let files = files(&["/music/x.mp3", "/music/y.mp3"]);
        let entries = vec![TracklistEntry::new(1, "One")];
        let mut output = Vec::new();
        let decisions =
            prompt_manual_matches(&files, &entries, &mut Cursor::new(""), &mut output).unwrap();
        assert!(decisions
            .iter()
            .all(|decision| matches!(decision, ManualDecision::Skip { .. })));
        assert_eq!(decisions.len(), 2);
    }

    #[test]
    fn test_terminal_resolver_uses_given_streams() {
        let files = files(&["/music/x.mp3"]);
        let entries = vec![TracklistEntry::new(1, "One")];
        let mut resolver = TerminalResolver::new(Cursor::new("1\n"), Vec::new());
        let decisions = resolver.resolve(&files, &entries).unwrap();
        assert_eq!(
            decisions,
            vec![ManualDecision::Assign {
                file: PathBuf::from("/music/x.mp3"),
                entry_position: 1
            }]
        );
    }
}
