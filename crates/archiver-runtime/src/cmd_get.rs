//! `archiver get`: look up archived names through the running relay.

use archiver_core::{ClientRequest, NameMap, RelayBody};

use crate::client::rpc_call;

pub async fn cmd_get(socket_path: &str, hashes: Vec<String>) -> anyhow::Result<()> {
    let body = rpc_call(socket_path, ClientRequest::Get { hashes }).await?;
    match body {
        RelayBody::Get { msg } => {
            print!("{}", format_names(&msg));
            Ok(())
        }
        RelayBody::Error(failure) => anyhow::bail!("{failure}"),
        other => anyhow::bail!("unexpected relay reply: {other:?}"),
    }
}

/// One `hash<TAB>name` line per hash; unnamed hashes show `-`.
pub(crate) fn format_names(names: &NameMap) -> String {
    let mut out = String::new();
    for (hash, name) in names {
        out.push_str(hash);
        out.push('\t');
        out.push_str(name.as_deref().unwrap_or("-"));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unnamed_hashes_show_dash() {
        let names: NameMap = [
            ("abc123".to_string(), Some("vacation.png".to_string())),
            ("def456".to_string(), None),
        ]
        .into_iter()
        .collect();
        assert_eq!(format_names(&names), "abc123\tvacation.png\ndef456\t-\n");
    }

    #[test]
    fn empty_map_prints_nothing() {
        assert_eq!(format_names(&NameMap::new()), "");
    }
}
