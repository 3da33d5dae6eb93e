use anyhow::{anyhow, bail, Result};
use log::{debug, warn};
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

/// Which side of the likelihood-ratio test an engine run fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hypothesis {
    Alternative,
    Null,
}

impl Hypothesis {
    pub fn tag(&self) -> &'static str {
        match self {
            Hypothesis::Alternative => "alt",
            Hypothesis::Null => "null",
        }
    }

    /// Control-file overrides selecting this hypothesis: the null model
    /// pins omega at the neutral value, the alternative frees it.
    fn overrides(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Hypothesis::Alternative => &[("fix_omega", "0")],
            Hypothesis::Null => &[("fix_omega", "1"), ("omega", "1")],
        }
    }
}

/// Parsed result of one engine run. Both fields are absent when the
/// output file was missing or unparsable; downstream code treats that
/// as a retry-needed accession, not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelFit {
    pub lnl: Option<f64>,
    pub np: Option<u32>,
}

impl ModelFit {
    pub fn complete(&self) -> Option<(f64, u32)> {
        Some((self.lnl?, self.np?))
    }
}

/// An engine control-file template: ordered `key = value` pairs
/// consumed opaquely and re-rendered per run with the per-hypothesis
/// overrides substituted.
#[derive(Debug, Clone)]
pub struct CtlTemplate {
    options: Vec<(String, String)>,
}

impl CtlTemplate {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read {}: {e}", path.display()))?;

        let mut options = vec![];
        for line in text.lines() {
            // Everything after '*' is a comment
            let line = line.split('*').next().unwrap_or_default();
            if let Some((key, val)) = line.split_once('=') {
                let (key, val) = (key.trim(), val.trim());
                if !key.is_empty() {
                    options.push((key.to_string(), val.to_string()));
                }
            }
        }

        if options.is_empty() {
            bail!("No options in control template {}", path.display());
        }

        Ok(Self { options })
    }

    /// Render a runnable control file: template options in their
    /// original order with the per-run paths and hypothesis overrides
    /// substituted in place, and any override the template lacked
    /// appended at the end.
    fn render(
        &self,
        seqfile: &Path,
        treefile: &Path,
        outfile: &Path,
        hypothesis: Hypothesis,
    ) -> String {
        let mut overrides: Vec<(String, String)> = vec![
            ("seqfile".to_string(), seqfile.display().to_string()),
            ("treefile".to_string(), treefile.display().to_string()),
            ("outfile".to_string(), outfile.display().to_string()),
            ("Small_Diff".to_string(), "4.5e-07".to_string()),
        ];
        for (key, val) in hypothesis.overrides() {
            overrides.push((key.to_string(), val.to_string()));
        }

        let mut lines = vec![];
        for (key, val) in &self.options {
            match overrides.iter().position(|(k, _)| k == key) {
                Some(i) => {
                    let (key, val) = overrides.remove(i);
                    lines.push(format!("{key} = {val}"));
                }
                _ => lines.push(format!("{key} = {val}")),
            }
        }
        for (key, val) in overrides {
            lines.push(format!("{key} = {val}"));
        }

        lines.join("\n") + "\n"
    }
}

/// One blocking engine invocation per hypothesis: renders the control
/// file into the accession's working directory, runs the engine there,
/// and parses the output file it leaves behind. Engine crashes,
/// timeouts, and garbage output all come back as an empty `ModelFit`.
#[derive(Debug)]
pub struct ModelRunner<'a> {
    pub engine: &'a Path,
    pub template: &'a CtlTemplate,
    pub timeout: Duration,
    pub verbose: bool,
}

impl ModelRunner<'_> {
    pub fn run(
        &self,
        workdir: &Path,
        msa_path: &Path,
        tree_path: &Path,
        accession: &str,
        hypothesis: Hypothesis,
    ) -> Result<(PathBuf, ModelFit)> {
        let tag = hypothesis.tag();
        let output_path = workdir.join(format!("{accession}_{tag}_mdl_output"));
        let ctl_path = workdir.join(format!("{accession}_{tag}.ctl"));
        fs::write(
            &ctl_path,
            self.template
                .render(msa_path, tree_path, &output_path, hypothesis),
        )?;

        debug!(
            r#"Running "{} {}" for {accession}"#,
            self.engine.display(),
            ctl_path.display()
        );

        let stdout = if self.verbose {
            Stdio::inherit()
        } else {
            Stdio::null()
        };
        let child = Command::new(self.engine)
            .arg(&ctl_path)
            .current_dir(workdir)
            .stdout(stdout)
            .stderr(Stdio::null())
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("{accession}: failed to start engine: {e}");
                return Ok((output_path, ModelFit::default()));
            }
        };

        let started = Instant::now();
        loop {
            match child.try_wait()? {
                Some(status) => {
                    if !status.success() {
                        warn!("{accession}: engine exited with {status} for the {tag} model");
                    }
                    break;
                }
                _ if started.elapsed() > self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(
                        "{accession}: engine timed out after {}s for the {tag} model",
                        self.timeout.as_secs()
                    );
                    return Ok((output_path, ModelFit::default()));
                }
                _ => thread::sleep(Duration::from_millis(100)),
            }
        }

        let fit = parse_output(&output_path);
        debug!("{accession}: {tag} model fit = {fit:?}");
        Ok((output_path, fit))
    }
}

// --------------------------------------------------
/// Extract the log-likelihood and free-parameter count from an engine
/// output file. A missing or unparsable file yields an empty fit.
pub fn parse_output(path: &Path) -> ModelFit {
    match fs::read_to_string(path) {
        Ok(text) => parse_output_text(&text),
        _ => ModelFit::default(),
    }
}

// --------------------------------------------------
/// The free-parameter count comes from the first `lnL(ntime: ..` line
/// in the file; the log-likelihood from that line inside the
/// site-class-2 result block (`Model 2:`), the class the engine uses to
/// report the omega-varying fit.
fn parse_output_text(text: &str) -> ModelFit {
    let model_header = Regex::new(r"^Model\s+(\d+):").unwrap();
    let lnl_line =
        Regex::new(r"^lnL\(ntime:\s*\d+\s+np:\s*(\d+)\):\s*(-?\d+(?:\.\d+)?)")
            .unwrap();

    let mut fit = ModelFit::default();
    let mut site_class: Option<u32> = None;
    for line in text.lines() {
        if let Some(caps) = model_header.captures(line) {
            site_class = caps[1].parse().ok();
        } else if let Some(caps) = lnl_line.captures(line) {
            if fit.np.is_none() {
                fit.np = caps[1].parse().ok();
            }
            if site_class == Some(2) && fit.lnl.is_none() {
                fit.lnl = caps[2].parse().ok();
            }
        }
    }

    fit
}
