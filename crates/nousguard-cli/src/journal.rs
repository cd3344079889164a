use std::io::Write;

use color_eyre::Result;
use nousguard_core::journal::{JournalRepository, ListedEntry};

use crate::{cli::JournalCommand, config, storage};

/// Execute a journal subcommand against the encrypted journal.
pub async fn handle(cmd: JournalCommand, config: &config::Config) -> Result<()> {
    let repo = storage::open_journal(config).await?;
    let mut stdout = std::io::stdout().lock();
    run(cmd, &*repo, &mut stdout).await
}

pub async fn run<R, W>(cmd: JournalCommand, repo: &R, out: &mut W) -> Result<()>
where
    R: JournalRepository + ?Sized,
    W: Write,
{
    match cmd {
        JournalCommand::List => {
            let entries = repo
                .list()
                .await
                .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
            if entries.is_empty() {
                writeln!(
                    out,
                    "No entries yet. Add one with `nousguard journal add --title <title> <text>`."
                )?;
                return Ok(());
            }
            for entry in &entries {
                write_listed(out, entry)?;
            }
        }
        JournalCommand::Show { id } => {
            let entry = repo
                .get(id)
                .await
                .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?
                .ok_or_else(|| color_eyre::eyre::eyre!("no journal entry with id {id}"))?;
            writeln!(out, "{} [{}] {}", entry.id, entry.timestamp.to_rfc3339(), entry.title)?;
            writeln!(out)?;
            writeln!(out, "{}", entry.content)?;
        }
        JournalCommand::Add { title, content } => {
            let entry = repo
                .insert(title, content.join(" "))
                .await
                .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
            writeln!(out, "Created entry {}: {}", entry.id, entry.title)?;
        }
        JournalCommand::Edit { id, title, content } => {
            let entry = repo
                .update(id, title, content.join(" "))
                .await
                .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
            writeln!(out, "Updated entry {}: {}", entry.id, entry.title)?;
        }
        JournalCommand::Delete { id } => {
            repo.delete(id)
                .await
                .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
            writeln!(out, "Deleted entry {id}")?;
        }
    }

    Ok(())
}

fn write_listed<W: Write>(out: &mut W, entry: &ListedEntry) -> Result<()> {
    let marker = if entry.is_readable() { "" } else { " (unreadable)" };
    writeln!(
        out,
        "{} [{}] {}{}",
        entry.id(),
        entry.timestamp().format("%Y-%m-%d %H:%M"),
        entry.title(),
        marker
    )?;
    if let Some(first_line) = entry.content().lines().next() {
        writeln!(out, "    {first_line}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage;

    async fn run_to_string<R: JournalRepository + ?Sized>(
        cmd: JournalCommand,
        repo: &R,
    ) -> Result<String> {
        let mut buf = Vec::new();
        run(cmd, repo, &mut buf).await?;
        Ok(String::from_utf8(buf).expect("utf8 output"))
    }

    #[tokio::test]
    async fn add_list_edit_delete_flow() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = storage::test_journal(dir.path()).await;

        let empty = run_to_string(JournalCommand::List, &*repo)
            .await
            .expect("list");
        assert!(empty.starts_with("No entries yet"));

        let added = run_to_string(
            JournalCommand::Add {
                title: "Monday".into(),
                content: vec!["felt".into(), "calm".into()],
            },
            &*repo,
        )
        .await
        .expect("add");
        assert_eq!(added, "Created entry 1: Monday\n");

        let listed = run_to_string(JournalCommand::List, &*repo)
            .await
            .expect("list");
        assert!(listed.contains("Monday"));
        assert!(listed.contains("    felt calm"));

        run_to_string(
            JournalCommand::Edit {
                id: 1,
                title: "Tuesday".into(),
                content: vec!["rested".into()],
            },
            &*repo,
        )
        .await
        .expect("edit");
        let shown = run_to_string(JournalCommand::Show { id: 1 }, &*repo)
            .await
            .expect("show");
        assert!(shown.contains("Tuesday"));
        assert!(shown.ends_with("rested\n"));

        run_to_string(JournalCommand::Delete { id: 1 }, &*repo)
            .await
            .expect("delete");
        assert!(run_to_string(JournalCommand::Show { id: 1 }, &*repo)
            .await
            .is_err());
    }

    #[test]
    fn unreadable_entries_are_marked() {
        let entry = ListedEntry::Unreadable {
            id: 9,
            timestamp: chrono::Utc::now(),
            reason: "invalid padding".into(),
        };
        let mut buf = Vec::new();
        write_listed(&mut buf, &entry).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("Decryption Failed! (unreadable)"));
        assert!(text.contains("Error: Cannot decrypt content."));
    }
}
