//! The launcher script generator (§4.I): pinned search-path stubs plus an
//! optional interpreter launcher.
//!
//! Grounded on `elba::build::context.rs`'s "write a file only if its bytes
//! differ" idempotence check and `elba::util::graph`'s ordered traversal of
//! a `WorkingSet` for computing a search path; the shell-escaping of path
//! literals is done with `shell-escape`, the same crate the teacher carries
//! for safely quoting paths passed to a subprocess.

use crate::distribution::WorkingSet;
use crate::util::error::Result;
use crate::util::path::relative_to;
use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

/// A `(display_name, module, attr)` triple naming one launcher to generate
/// (§4.I). `display_name` becomes the file name under the destination
/// directory.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub display_name: String,
    pub module: String,
    pub attr: String,
}

/// Where the search path should be expressed as absolute directories, or as
/// `join(base, rel)` expressions relative to a root the launcher can find
/// relative to its own location (§4.I).
#[derive(Debug, Clone)]
pub enum PathRoot {
    Absolute,
    RelativeTo(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LauncherSpec {
    pub executable: PathBuf,
    pub dest_dir: PathBuf,
    pub entry_points: Vec<EntryPoint>,
    /// When set, also write an interpreter launcher under this name (§4.I).
    pub interpreter_name: Option<String>,
    pub prelude: Option<String>,
    pub fixed_args: Vec<String>,
    pub path_root: PathRoot,
}

/// Render the list of search-path directories a working set contributes,
/// as a newline-joined, quoted literal list (one entry per line, already
/// shell-escaped so a generated script can embed it verbatim).
fn path_entries(spec: &LauncherSpec, ws: &WorkingSet) -> Result<Vec<String>> {
    let mut dists: Vec<_> = ws.iter().collect();
    dists.sort_by(|a, b| a.project.cmp(&b.project));

    let mut entries = Vec::with_capacity(dists.len());
    for dist in dists {
        let literal = match &spec.path_root {
            PathRoot::Absolute => dist.location.to_string_lossy().into_owned(),
            PathRoot::RelativeTo(root) => {
                let rel = relative_to(root, &dist.location)?;
                format!("join(base, {})", quote(&rel.to_string_lossy()))
            }
        };
        entries.push(literal);
    }
    Ok(entries)
}

fn quote(s: &str) -> String {
    shell_escape::escape(s.into()).into_owned()
}

/// Render one entry-point launcher's full text (§4.I): header, path setup,
/// prelude, module import, and the `__main__` invocation.
fn render_entry_point(spec: &LauncherSpec, ep: &EntryPoint, path_lines: &[String]) -> String {
    let mut out = String::new();
    out.push_str(&format!("#!{}\n", spec.executable.display()));
    out.push_str("import sys\n");

    match &spec.path_root {
        PathRoot::Absolute => {
            out.push_str("path = [\n");
            for line in path_lines {
                out.push_str(&format!("    {},\n", quote(line)));
            }
            out.push_str("]\n");
        }
        PathRoot::RelativeTo(_) => {
            out.push_str("import os\n");
            out.push_str("base = os.path.dirname(os.path.dirname(os.path.abspath(__file__)))\n");
            out.push_str("def join(base, rel):\n    return os.path.join(base, rel)\n");
            out.push_str("path = [\n");
            for line in path_lines {
                out.push_str(&format!("    {},\n", line));
            }
            out.push_str("]\n");
        }
    }
    out.push_str("sys.path[0:0] = path\n\n");

    if let Some(prelude) = &spec.prelude {
        out.push_str(prelude);
        if !prelude.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }

    out.push_str(&format!("import {}\n\n", ep.module));
    out.push_str("if __name__ == '__main__':\n");
    let args: Vec<String> = spec.fixed_args.iter().map(|a| quote(a)).collect();
    out.push_str(&format!(
        "    sys.exit({}.{}({}))\n",
        ep.module,
        ep.attr,
        args.join(", ")
    ));
    out
}

/// Render the interpreter launcher variant: a subset of the host
/// interpreter's own command line (`-i`, `-c`, `-S`, `-V`) with the same
/// pinned search path, for recipes that need "an interpreter with only
/// these eggs on the path" (§4.I).
fn render_interpreter(spec: &LauncherSpec, path_lines: &[String]) -> String {
    let mut out = String::new();
    out.push_str(&format!("#!{}\n", spec.executable.display()));
    out.push_str("import sys, code, getopt\n");
    out.push_str("path = [\n");
    for line in path_lines {
        match &spec.path_root {
            PathRoot::Absolute => out.push_str(&format!("    {},\n", quote(line))),
            PathRoot::RelativeTo(_) => out.push_str(&format!("    {},\n", line)),
        }
    }
    out.push_str("]\n");
    out.push_str("sys.path[0:0] = path\n\n");
    out.push_str(
        "opts, args = getopt.getopt(sys.argv[1:], 'ic:SV')\n\
         interactive = False\n\
         command = None\n\
         for opt, val in opts:\n\
         \x20   if opt == '-i':\n\
         \x20       interactive = True\n\
         \x20   elif opt == '-c':\n\
         \x20       command = val\n\
         \x20   elif opt == '-V':\n\
         \x20       print(sys.version)\n\
         \x20       sys.exit(0)\n\n\
         if command is not None:\n\
         \x20   exec(command)\n\
         elif args:\n\
         \x20   sys.argv = args\n\
         \x20   with open(args[0]) as f:\n\
         \x20       exec(f.read())\n\
         else:\n\
         \x20   code.interact(local=globals())\n",
    );
    out
}

/// Write `contents` to `path` only if its bytes differ from what's already
/// there, so a no-op rerun leaves the file's mtime untouched (§4.I, §8
/// invariant 9); set the executable bit afterward, best effort.
fn write_if_changed(path: &Path, contents: &str) -> Result<()> {
    if let Ok(existing) = fs::read_to_string(path) {
        if existing == contents {
            return Ok(());
        }
    }
    fs::write(path, contents)?;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)?;
    Ok(())
}

/// Generate every launcher `spec` describes, returning the paths written
/// (including the interpreter launcher, when requested).
pub fn generate(spec: &LauncherSpec, ws: &WorkingSet) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(&spec.dest_dir)?;
    let path_lines = path_entries(spec, ws)?;

    let mut written = Vec::new();
    for ep in &spec.entry_points {
        let path = spec.dest_dir.join(&ep.display_name);
        let contents = render_entry_point(spec, ep, &path_lines);
        write_if_changed(&path, &contents)?;
        written.push(path);
    }

    if let Some(name) = &spec.interpreter_name {
        let path = spec.dest_dir.join(name);
        let contents = render_interpreter(spec, &path_lines);
        write_if_changed(&path, &contents)?;
        written.push(path);
    }

    Ok(written)
}
