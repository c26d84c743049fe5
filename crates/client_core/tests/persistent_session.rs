use client_core::{config::Settings, RegistryClient};
use shared::protocol::LoginRequest;

fn quiet_settings(state_dir: &std::path::Path) -> Settings {
    Settings {
        min_delay_ms: 0,
        max_delay_ms: 0,
        error_probability: 0.0,
        timeout_probability: 0.0,
        fault_seed: Some(11),
        state_dir: state_dir.to_path_buf(),
        ..Settings::default()
    }
}

#[tokio::test]
async fn session_survives_a_client_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = quiet_settings(dir.path());

    let first = RegistryClient::new(&settings);
    first.load_all().await;
    first
        .auth()
        .login(LoginRequest {
            username: "admin".to_string(),
            password: "admin123".to_string(),
        })
        .await
        .expect("login");

    let second = RegistryClient::new(&settings);
    let restored = second.auth().restore().await;
    assert!(restored.is_authenticated);
    assert!(second.auth().is_admin().await);

    second.auth().logout().await;
    let third = RegistryClient::new(&settings);
    assert!(!third.auth().restore().await.is_authenticated);
}

#[tokio::test]
async fn fresh_client_reads_the_simulated_backend() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = RegistryClient::new(&quiet_settings(dir.path()));

    client.load_all().await;
    let stats = client.student_statistics().await;
    assert_eq!(stats.total, 3);
    assert_eq!(stats.average_grade, 8.33);
    assert_eq!(stats.top_student.map(|s| s.dni), Some("87654321".to_string()));

    let enrollment = client.enrollment_statistics().await;
    assert_eq!(enrollment.avg_enrollments_per_student, 1.5);
    assert_eq!(enrollment.avg_enrollments_per_course, 1.0);
}
