use std::fmt;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Check the binaries the `golang` strategy shells out to.
/// An empty list means all prerequisites are met. `gox` is installed on demand.
pub fn check_golang_prereqs() -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_exists("go") {
        missing.push(MissingPrereq {
            name: "go".to_owned(),
            purpose: "fetching, testing and cross-compiling Go packages",
            install_hint: "https://go.dev/dl/ | apt install golang | dnf install golang | brew install go",
        });
    }

    if !command_exists("git") {
        missing.push(MissingPrereq {
            name: "git".to_owned(),
            purpose: "switching the checkout to the requested branch",
            install_hint: "apt install git | dnf install git | pacman -S git | brew install git",
        });
    }

    if !command_exists("bash") {
        missing.push(MissingPrereq {
            name: "bash".to_owned(),
            purpose: "running prep commands",
            install_hint: "apt install bash | dnf install bash | brew install bash",
        });
    }

    missing
}

/// Check that the resolved signing program is on PATH.
pub fn check_signing_prereqs(program: &str) -> Vec<MissingPrereq> {
    if command_exists(program) {
        return Vec::new();
    }
    vec![MissingPrereq {
        name: program.to_owned(),
        purpose: "creating and verifying detached signatures",
        install_hint: "apt install gnupg | dnf install gnupg2 | brew install gnupg",
    }]
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nmason shells out to these tools; set MASON_SKIP_PREREQS=1 to bypass this check.");
    msg
}
