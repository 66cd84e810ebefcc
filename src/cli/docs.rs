use std::error::Error;
use std::io::{self, Read};
use std::path::PathBuf;

use crate::cli::{resolve_folder, DocsCommands};
use crate::core::config::Config;
use crate::core::documents::{DocumentNode, DocumentStore};
use crate::ui::markdown::render;

pub(crate) fn format_tree(nodes: &[DocumentNode]) -> String {
    fn walk(nodes: &[DocumentNode], depth: usize, out: &mut String) {
        for node in nodes {
            out.push_str(&"  ".repeat(depth));
            match node {
                DocumentNode::File { name, .. } => {
                    out.push_str(name);
                    out.push('\n');
                }
                DocumentNode::Directory { name, children, .. } => {
                    out.push_str(name);
                    out.push_str("/\n");
                    walk(children, depth + 1, out);
                }
            }
        }
    }

    let mut out = String::new();
    walk(nodes, 0, &mut out);
    out
}

pub fn run_docs(command: DocsCommands, folder: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    let store = DocumentStore::new(resolve_folder(&mut config, folder)?);

    match command {
        DocsCommands::List => {
            let tree = store.list_documents()?;
            if tree.is_empty() {
                println!("(no notes in {})", store.root().display());
            } else {
                print!("{}", format_tree(&tree));
            }
        }
        DocsCommands::Show { path } => {
            print!("{}", store.read_document(&path)?);
        }
        DocsCommands::Render { path } => {
            print!("{}", render(&store.read_document(&path)?));
        }
        DocsCommands::New { name } => {
            let created = store.create_document(&name)?;
            println!("✅ Created {created}");
        }
        DocsCommands::Rename { old, new } => {
            let renamed = store.rename_document(&old, &new)?;
            println!("✅ Renamed {old} to {renamed}");
        }
        DocsCommands::Write { path } => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            store.write_document(&path, &text)?;
            println!("✅ Saved {path}");
        }
    }
    Ok(())
}
