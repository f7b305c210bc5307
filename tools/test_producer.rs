//! Test Request Producer
//!
//! Generates random student records and sends them to the prediction
//! service over NATS request/reply, logging each answer.

use chrono::Utc;
use grade_prediction_service::feature_encoder::TOTAL_SCORE_WEIGHTS;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// Student record in the shape the service accepts
#[derive(Debug, Clone, Serialize)]
struct StudentRecord {
    age: u32,
    gender: String,
    attendance: f64,
    midterm_score: f64,
    final_score: f64,
    assignments_avg: f64,
    quizzes_avg: f64,
    participation_score: f64,
    projects_score: f64,
    total_score: f64,
    study_hours_per_week: f64,
    stress_level: u32,
    sleep_hours_per_night: f64,
    department: String,
    extracurricular_activities: String,
    internet_access_at_home: String,
    parent_education_level: String,
    family_income_level: String,
}

/// Record generator for testing
struct RecordGenerator {
    rng: rand::rngs::ThreadRng,
}

impl RecordGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    fn score(&mut self, low: f64, high: f64) -> f64 {
        (self.rng.gen_range(low..high) * 10.0_f64).round() / 10.0
    }

    /// Generate a record for a student doing well
    fn generate_strong(&mut self) -> StudentRecord {
        let scores = [
            self.score(75.0, 100.0),
            self.score(75.0, 100.0),
            self.score(75.0, 100.0),
            self.score(75.0, 100.0),
            self.score(75.0, 100.0),
        ];
        let attendance = self.score(85.0, 100.0);
        let study_hours = self.score(12.0, 30.0);
        self.build(scores, attendance, study_hours)
    }

    /// Generate a record for a struggling student
    fn generate_struggling(&mut self) -> StudentRecord {
        let scores = [
            self.score(30.0, 65.0),
            self.score(30.0, 65.0),
            self.score(30.0, 65.0),
            self.score(30.0, 65.0),
            self.score(30.0, 65.0),
        ];
        let attendance = self.score(50.0, 75.0);
        let study_hours = self.score(1.0, 8.0);
        self.build(scores, attendance, study_hours)
    }

    fn build(&mut self, scores: [f64; 5], attendance: f64, study_hours: f64) -> StudentRecord {
        let [midterm, final_score, assignments, quizzes, projects] = scores;
        let total = weighted_total(scores);

        StudentRecord {
            age: self.rng.gen_range(18..25),
            gender: self.random_choice(&["Male", "Female"]).to_string(),
            attendance,
            midterm_score: midterm,
            final_score,
            assignments_avg: assignments,
            quizzes_avg: quizzes,
            participation_score: self.score(0.0, 10.0),
            projects_score: projects,
            total_score: (total * 100.0).round() / 100.0,
            study_hours_per_week: study_hours,
            stress_level: self.rng.gen_range(1..11),
            sleep_hours_per_night: self.score(4.0, 9.0),
            department: self
                .random_choice(&["CS", "Engineering", "Business", "Mathematics"])
                .to_string(),
            extracurricular_activities: self.random_choice(&["Yes", "No"]).to_string(),
            internet_access_at_home: self.random_choice(&["Yes", "No"]).to_string(),
            parent_education_level: self
                .random_choice(&["High School", "Bachelor's", "Master's", "PhD", "None"])
                .to_string(),
            family_income_level: self.random_choice(&["Low", "Medium", "High"]).to_string(),
        }
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

/// Weighted total over midterm, final, assignments, quizzes and projects
fn weighted_total(scores: [f64; 5]) -> f64 {
    scores
        .iter()
        .zip(TOTAL_SCORE_WEIGHTS)
        .map(|(score, weight)| score * weight)
        .sum()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Request Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("grades.predict");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(20);
    let batch_size: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(1);
    let struggling_rate: f64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(0.3);
    let delay_ms: u64 = args.get(6).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count,
        batch_size,
        struggling_rate,
        delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, struggling_rate, delay_ms).await;
        }
    };

    let mut generator = RecordGenerator::new();
    let mut rng = rand::thread_rng();
    let started = Utc::now();

    let mut answered = 0u64;
    let mut errors = 0u64;

    for i in 0..count {
        let records: Vec<StudentRecord> = (0..batch_size.max(1))
            .map(|_| {
                if rng.gen_bool(struggling_rate) {
                    generator.generate_struggling()
                } else {
                    generator.generate_strong()
                }
            })
            .collect();

        let payload = if records.len() == 1 {
            serde_json::to_vec(&records[0])?
        } else {
            serde_json::to_vec(&records)?
        };

        match client.request(subject.to_string(), payload.into()).await {
            Ok(reply) => {
                answered += 1;
                let body: Value = serde_json::from_slice(&reply.payload)?;
                let failed = match &body {
                    Value::Array(results) => {
                        results.iter().filter(|r| r.get("error").is_some()).count()
                    }
                    single => usize::from(single.get("error").is_some()),
                };
                errors += failed as u64;
                info!(request = i + 1, failed, "Reply: {}", body);
            }
            Err(e) => {
                warn!(request = i + 1, error = %e, "Request failed");
            }
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    let elapsed = Utc::now() - started;
    info!(
        "Completed! {} of {} requests answered, {} record errors, {} ms elapsed",
        answered,
        count,
        errors,
        elapsed.num_milliseconds()
    );

    Ok(())
}

async fn run_dry_mode(count: u64, struggling_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = RecordGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let record = if rng.gen_bool(struggling_rate) {
            generator.generate_struggling()
        } else {
            generator.generate_strong()
        };

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample record {}:\n{}", i + 1, serde_json::to_string_pretty(&record)?);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
