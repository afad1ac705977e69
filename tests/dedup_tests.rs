//! Dedup engine properties exercised through the public crate surface

use chrono::Utc;
use jobharvest::infrastructure::database_connection::DatabaseConnection;
use jobharvest::infrastructure::job_repository::{InsertOutcome, JobFilter, JobRepository};
use jobharvest::JobRecord;
use tempfile::TempDir;

async fn open_repo() -> (TempDir, JobRepository) {
    let dir = TempDir::new().unwrap();
    let db = DatabaseConnection::new(&dir.path().join("jobs.db")).await.unwrap();
    db.migrate().await.unwrap();
    (dir, JobRepository::new(db.pool().clone()))
}

fn job(title: &str, company: &str, location: &str) -> JobRecord {
    JobRecord::scraped(
        title,
        company,
        location,
        "A description of the role with enough detail to store.",
        "https://www.reed.co.uk/jobs/1",
        "reed",
    )
}

#[tokio::test]
async fn similar_titles_with_same_company_location_collapse() {
    let (_dir, repo) = open_repo().await;

    repo.insert_job(&job("Senior Python Developer", "Acme", "Leeds")).await.unwrap();
    let (outcome, _) = repo
        .insert_job(&job("Senior Python Developer.", "Acme", "Leeds"))
        .await
        .unwrap();

    assert_eq!(outcome, InsertOutcome::Updated);
    assert_eq!(repo.count_jobs(&JobFilter::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn dissimilar_titles_produce_two_rows() {
    let (_dir, repo) = open_repo().await;

    repo.insert_job(&job("Senior Python Developer", "Acme", "Leeds")).await.unwrap();
    let (outcome, _) = repo
        .insert_job(&job("Head of Marketing", "Acme", "Leeds"))
        .await
        .unwrap();

    assert_eq!(outcome, InsertOutcome::Added);
    assert_eq!(repo.count_jobs(&JobFilter::default()).await.unwrap(), 2);
}

#[tokio::test]
async fn same_title_different_location_is_a_different_job() {
    let (_dir, repo) = open_repo().await;

    repo.insert_job(&job("Python Developer", "Acme", "Leeds")).await.unwrap();
    let (outcome, _) = repo
        .insert_job(&job("Python Developer", "Acme", "Remote"))
        .await
        .unwrap();

    assert_eq!(outcome, InsertOutcome::Added);
    assert_eq!(repo.count_jobs(&JobFilter::default()).await.unwrap(), 2);
}

#[tokio::test]
async fn rescrape_refreshes_unedited_rows() {
    let (_dir, repo) = open_repo().await;

    repo.insert_job(&job("Python Developer", "Acme", "Leeds")).await.unwrap();

    let mut fresher = job("Python Developer", "Acme", "Leeds");
    fresher.salary = Some("£75,000".to_string());
    fresher.scraped_at = Utc::now();
    repo.insert_job(&fresher).await.unwrap();

    let stored = repo.list_jobs(&JobFilter::default(), 10, 0).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].salary.as_deref(), Some("£75,000"));
}

#[tokio::test]
async fn edit_protection_leaves_rows_byte_identical() {
    let (_dir, repo) = open_repo().await;

    repo.insert_job(&job("Python Developer", "Acme", "Leeds")).await.unwrap();
    let id = repo.list_jobs(&JobFilter::default(), 1, 0).await.unwrap()[0]
        .id
        .unwrap();

    // Any user-facing mutation activates the protection invariant
    repo.mark_applied(id, true).await.unwrap();
    let before = repo.get_job(id).await.unwrap().unwrap();
    assert!(before.is_edited);

    let mut incoming = job("Python Developer", "Acme", "Leeds");
    incoming.description = "overwritten by a later scrape".to_string();
    incoming.url = "https://www.reed.co.uk/jobs/other".to_string();
    let (outcome, reason) = repo.insert_job(&incoming).await.unwrap();

    assert_eq!(outcome, InsertOutcome::Skipped);
    assert!(reason.to_lowercase().contains("edited"));

    let after = repo.get_job(id).await.unwrap().unwrap();
    assert_eq!(after.title, before.title);
    assert_eq!(after.description, before.description);
    assert_eq!(after.url, before.url);
    assert_eq!(after.salary, before.salary);
    assert_eq!(after.scraped_at, before.scraped_at);
    assert_eq!(after.status, before.status);
    assert_eq!(after.notes, before.notes);
}

#[tokio::test]
async fn inserting_identical_record_twice_keeps_one_row() {
    let (_dir, repo) = open_repo().await;

    let record = job("Python Developer", "Acme", "Leeds");
    let (first, _) = repo.insert_job(&record).await.unwrap();
    let (second, reason) = repo.insert_job(&record).await.unwrap();

    assert_eq!(first, InsertOutcome::Added);
    assert_ne!(second, InsertOutcome::Added);
    assert!(reason.to_lowercase().contains("duplicate"));
    assert_eq!(repo.count_jobs(&JobFilter::default()).await.unwrap(), 1);
}
