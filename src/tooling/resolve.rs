use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

pub fn resolve_program(program: &str) -> PathBuf {
    resolve_program_in(program, env::var_os("PATH").as_deref())
}

// Bare names are looked up on the search path; anything with a separator is a
// configured location and is used as given. An unresolved name is returned
// unchanged so the spawn reports the failure.
pub fn resolve_program_in(program: &str, search_path: Option<&OsStr>) -> PathBuf {
    let program = program.trim();
    let as_path = Path::new(program);
    if as_path.is_absolute() || as_path.components().count() > 1 {
        return as_path.to_path_buf();
    }
    let Some(search_path) = search_path else {
        return as_path.to_path_buf();
    };

    for dir in env::split_paths(search_path) {
        for candidate in candidate_names(program) {
            let full = dir.join(candidate.as_str());
            if full.is_file() {
                return full;
            }
        }
    }
    as_path.to_path_buf()
}

fn candidate_names(program: &str) -> Vec<String> {
    let mut names = vec![program.to_string()];
    if cfg!(windows) && Path::new(program).extension().is_none() {
        names.push(format!("{program}.exe"));
    }
    names
}
