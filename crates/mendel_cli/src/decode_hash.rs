//! `mendel decode-hash`, shows what a tree hash contains.

use mendel_core::TreeHash;

use crate::GlobalArgs;

/// Runs the `mendel decode-hash` command.
///
/// Exits with code 1 for a malformed hash, printing the decode error.
/// Whitespace around a pasted hash is ignored.
pub fn run(hash: &str, _global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    match TreeHash::decode(hash.trim()) {
        Ok(tree) => {
            println!("{}", describe(&tree));
            Ok(0)
        }
        Err(e) => {
            eprintln!("{}: {e}", e.code());
            Ok(1)
        }
    }
}

fn describe(tree: &TreeHash) -> String {
    let branches: Vec<String> = tree.branches().iter().map(u8::to_string).collect();
    format!(
        "branches:   [{}]\nfile count: {}\ndigest:     {}",
        branches.join(", "),
        tree.file_count(),
        tree.digest()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mendel_common::SourceDigest;

    #[test]
    fn describes_a_round_tripped_hash() {
        let digest = SourceDigest::of(b"main.js");
        let tree = TreeHash::new(&[0, 2, 1], 3, digest).unwrap();
        let decoded = TreeHash::decode(&tree.encode()).unwrap();
        let out = describe(&decoded);
        assert!(out.starts_with("branches:   [0, 2, 1]\nfile count: 3\n"));
        assert!(out.ends_with(&digest.to_string()));
    }

    fn global() -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
            config: None,
            env: None,
        }
    }

    #[test]
    fn pasted_hash_with_newline_decodes() {
        let tree = TreeHash::new(&[0], 1, SourceDigest::of(b"main.js")).unwrap();
        let pasted = format!("  {}\n", tree.encode());
        assert_eq!(run(&pasted, &global()).unwrap(), 0);
    }

    #[test]
    fn malformed_hash_exits_with_one() {
        assert_eq!(run("garbage!", &global()).unwrap(), 1);
    }
}
