use std::str::FromStr;

use ahops_sync::primitives::EntryKind;

use crate::commands::error::CommandError;

pub(super) fn parse_kind(arg: &str) -> Result<EntryKind, CommandError> {
    EntryKind::from_str(&arg.to_ascii_lowercase()).map_err(CommandError::UnknownView)
}

/// `<view> <row>`
pub(super) fn parse_unlock_args(args: &[&str]) -> Result<(EntryKind, usize), CommandError> {
    match args {
        [] => Err(CommandError::MissingArgument("view")),
        [_] => Err(CommandError::MissingArgument("row")),
        [kind, row] => {
            let kind = parse_kind(kind)?;
            let row = row
                .parse::<usize>()
                .map_err(CommandError::ParseIntFromString)?;
            Ok((kind, row))
        }
        _ => Err(CommandError::InvalidArguments),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlock_args() {
        assert_eq!(
            parse_unlock_args(&["lease", "3"]),
            Ok((EntryKind::LeaseReserve, 3))
        );
        assert_eq!(
            parse_unlock_args(&["Contributions", "0"]),
            Ok((EntryKind::Contribution, 0))
        );
        assert_eq!(
            parse_unlock_args(&["lease"]),
            Err(CommandError::MissingArgument("row"))
        );
        assert!(matches!(
            parse_unlock_args(&["lease", "-1"]),
            Err(CommandError::ParseIntFromString(_))
        ));
        assert!(matches!(
            parse_unlock_args(&["staking", "1"]),
            Err(CommandError::UnknownView(_))
        ));
        assert_eq!(
            parse_unlock_args(&["lease", "1", "2"]),
            Err(CommandError::InvalidArguments)
        );
    }
}
