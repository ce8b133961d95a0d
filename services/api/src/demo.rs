use crate::infra::{build_pipeline, demo_sources, Pipeline};
use clap::Args;
use hireproof::error::AppError;
use hireproof::workflows::credentialing::{
    CandidateRef, CohortBatch, JobRequirement, JobSpec, PipelineConfig, PipelineError,
    ReviewResolution, SegmentStat,
};
use std::time::Duration;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Technical test score submitted for the thin-evidence candidate.
    #[arg(long, default_value_t = 82.0)]
    pub(crate) test_score: f64,
    /// Number of times the contest collector fails before succeeding.
    #[arg(long, default_value_t = 2)]
    pub(crate) flaky_failures: u32,
}

fn build(args: &DemoArgs) -> Result<Pipeline, AppError> {
    let mut config = PipelineConfig::from_env()?;
    // Keep the retry demo snappy.
    config.retry.base_backoff = Duration::from_millis(25);
    config.retry.call_timeout = Duration::from_secs(2);

    Ok(build_pipeline(
        config,
        demo_sources(),
        Some(args.flaky_failures),
    ))
}

fn priya() -> CandidateRef {
    CandidateRef {
        candidate_id: "cand-priya".to_string(),
        resume_key: Some("resumes/priya.pdf".to_string()),
        github_login: Some("priya-s".to_string()),
        leetcode_handle: Some("priya_codes".to_string()),
        profile_url: None,
    }
}

fn backend_job() -> JobSpec {
    JobSpec {
        title: "Senior Backend Engineer".to_string(),
        requirements: vec![
            JobRequirement::core("rust"),
            JobRequirement::core("postgresql"),
            JobRequirement::framework("kubernetes"),
            JobRequirement::framework("go"),
        ],
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let pipeline = build(&args)?;
    println!("Candidate credentialing pipeline demo");

    clean_pass(&pipeline).await?;
    test_gated_pass(&pipeline, args.test_score).await?;
    fraud_rejection(&pipeline).await?;
    bias_review_pass(&pipeline).await?;

    Ok(())
}

/// Strong candidate with a flaky contest source: retries absorb the outage
/// and the pipeline finishes with a signed, verifiable passport.
async fn clean_pass(pipeline: &Pipeline) -> Result<(), AppError> {
    println!("\n[1] Clean pass: full evidence, flaky contest source");
    let document = pipeline.service.register(priya(), backend_job())?;
    let (document, _) = pipeline.service.run(&document.application_id).await?;

    let view = pipeline.service.status(&document.application_id)?;
    println!("    status: {} ({})", view.status, view.detail);
    println!("    stages: {}", view.stages_completed.join(" -> "));

    let passport = pipeline.service.passport(&document.application_id)?;
    println!(
        "    passport {} for {} ({} at score {:.1})",
        passport.credential_id,
        passport.public_view.candidate_id,
        passport.public_view.match_status.label(),
        passport.public_view.match_score,
    );
    println!(
        "    verify(original) = {}",
        pipeline
            .service
            .verify(&passport.public_view, &passport.signature)
    );

    let mut tampered = passport.public_view.clone();
    tampered.match_score = 100.0;
    println!(
        "    verify(tampered) = {}",
        pipeline.service.verify(&tampered, &passport.signature)
    );
    Ok(())
}

/// Thin-evidence candidate pauses at the test gate, then resumes with the
/// submitted score folded into the assessment.
async fn test_gated_pass(pipeline: &Pipeline, test_score: f64) -> Result<(), AppError> {
    println!("\n[2] Test gate: thin evidence, score {test_score} submitted");
    let candidate = CandidateRef {
        candidate_id: "cand-rahul".to_string(),
        resume_key: Some("resumes/rahul.pdf".to_string()),
        github_login: None,
        leetcode_handle: None,
        profile_url: None,
    };
    let job = JobSpec {
        title: "Junior Backend Engineer".to_string(),
        requirements: vec![
            JobRequirement::core("rust"),
            JobRequirement::framework("docker"),
        ],
    };

    let document = pipeline.service.register(candidate, job)?;
    let (document, _) = pipeline.service.run(&document.application_id).await?;
    let view = pipeline.service.status(&document.application_id)?;
    println!("    paused: {} ({})", view.status, view.detail);

    pipeline
        .service
        .submit_test_result(&document.application_id, test_score)?;
    let (document, _) = pipeline.service.run(&document.application_id).await?;

    let passport = pipeline.service.passport(&document.application_id)?;
    println!(
        "    resumed and completed: {} at score {:.1}",
        passport.public_view.match_status.label(),
        passport.public_view.match_score,
    );
    Ok(())
}

/// Fabricated employment history is rejected at the gate; the collectors
/// never run and no passport exists.
async fn fraud_rejection(pipeline: &Pipeline) -> Result<(), AppError> {
    println!("\n[3] Fraud rejection: fabricated employment history");
    let candidate = CandidateRef {
        candidate_id: "cand-shadow".to_string(),
        resume_key: Some("resumes/shadow.pdf".to_string()),
        github_login: None,
        leetcode_handle: None,
        profile_url: None,
    };

    let document = pipeline.service.register(candidate, backend_job())?;
    let (document, _) = pipeline.service.run(&document.application_id).await?;

    let view = pipeline.service.status(&document.application_id)?;
    println!("    status: {} ({})", view.status, view.detail);
    println!(
        "    passport lookup: {}",
        pipeline
            .service
            .passport(&document.application_id)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_else(|| "unexpectedly present".to_string())
    );
    Ok(())
}

/// A systemic scoring gap in the cohort statistics pauses the pipeline for a
/// reviewer decision before matching output is acted on.
async fn bias_review_pass(pipeline: &Pipeline) -> Result<(), AppError> {
    println!("\n[4] Bias audit: systemic cohort gap requires a reviewer");
    let gap_batch = |gap: f64| CohortBatch {
        attribute: "gender".to_string(),
        segments: vec![
            SegmentStat {
                segment: "men".to_string(),
                mean_confidence: 71.0 + gap,
                sample_size: 120,
            },
            SegmentStat {
                segment: "women".to_string(),
                mean_confidence: 71.0,
                sample_size: 115,
            },
        ],
    };
    pipeline.cohorts.set(
        gap_batch(14.0),
        vec![gap_batch(13.5), gap_batch(12.8), gap_batch(13.1)],
    );

    let document = pipeline.service.register(priya(), backend_job())?;
    let (document, _) = pipeline.service.run(&document.application_id).await?;
    let view = pipeline.service.status(&document.application_id)?;
    println!("    paused: {} ({})", view.status, view.detail);

    for (ticket, flag) in pipeline.review.pending() {
        println!("    reviewer approves ticket for: {}", flag.reason);
        pipeline
            .review
            .resolve(&ticket, ReviewResolution::Approved)
            .map_err(PipelineError::Review)?;
    }
    pipeline.service.resume_after_review(&document.application_id)?;
    let (document, _) = pipeline.service.run(&document.application_id).await?;

    let view = pipeline.service.status(&document.application_id)?;
    println!("    resumed and completed: {} ({})", view.status, view.detail);
    Ok(())
}
