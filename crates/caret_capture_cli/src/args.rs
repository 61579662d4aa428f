//! Command-line parsing.

use std::path::PathBuf;

use generation_provider::GenerationKind;

use crate::CliError;

pub const USAGE: &str = "\
usage: caret-capture <improve|shorten|lengthen> <file> [options]
       caret-capture ask <question> <file> [options]

options:
  --replace       replace the captured text with the result
  --insert        insert the result at the caret
  --in-place      write the edited document back to <file>
  --caret <n>     caret position in characters (default: end of file)
  --window <n>    characters the simulated host exposes on each side (default: 50)";

pub const DEFAULT_WINDOW: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Rewrite(GenerationKind),
    Ask(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyMode {
    /// Print the generated text only.
    #[default]
    Preview,
    Replace,
    Insert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub action: CliAction,
    pub path: PathBuf,
    pub apply: ApplyMode,
    pub caret: Option<usize>,
    pub window: usize,
    pub in_place: bool,
}

impl CliArgs {
    /// Parses arguments, excluding the program name.
    pub fn parse<I>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let action_name = args.next().ok_or_else(|| usage("missing action"))?;
        let action = match GenerationKind::parse(&action_name) {
            Some(GenerationKind::Ask) => {
                let question = args.next().ok_or_else(|| usage("ask needs a question"))?;
                CliAction::Ask(question)
            }
            Some(kind) => CliAction::Rewrite(kind),
            None => return Err(usage(&format!("unknown action '{action_name}'"))),
        };

        let mut path = None;
        let mut apply = ApplyMode::Preview;
        let mut caret = None;
        let mut window = DEFAULT_WINDOW;
        let mut in_place = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--replace" => apply = set_apply(apply, ApplyMode::Replace)?,
                "--insert" => apply = set_apply(apply, ApplyMode::Insert)?,
                "--in-place" => in_place = true,
                "--caret" => caret = Some(parse_number(&arg, args.next())?),
                "--window" => {
                    window = parse_number(&arg, args.next())?;
                    if window == 0 {
                        return Err(usage("--window must be at least 1"));
                    }
                }
                flag if flag.starts_with("--") => {
                    return Err(usage(&format!("unknown option '{flag}'")))
                }
                _ if path.is_none() => path = Some(PathBuf::from(arg.clone())),
                _ => return Err(usage(&format!("unexpected argument '{arg}'"))),
            }
        }

        let path = path.ok_or_else(|| usage("missing file"))?;
        if in_place && apply == ApplyMode::Preview {
            return Err(usage("--in-place needs --replace or --insert"));
        }

        Ok(Self {
            action,
            path,
            apply,
            caret,
            window,
            in_place,
        })
    }
}

fn set_apply(current: ApplyMode, next: ApplyMode) -> Result<ApplyMode, CliError> {
    if current != ApplyMode::Preview && current != next {
        return Err(usage("--replace and --insert are mutually exclusive"));
    }
    Ok(next)
}

fn parse_number(flag: &str, value: Option<String>) -> Result<usize, CliError> {
    let value = value.ok_or_else(|| usage(&format!("{flag} needs a value")))?;
    value
        .trim()
        .parse()
        .map_err(|_| usage(&format!("{flag} expects a number, got '{value}'")))
}

fn usage(message: &str) -> CliError {
    CliError::Usage(message.to_string())
}
