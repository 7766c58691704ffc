use axum::http::StatusCode;
use serde_json::{Value, json};
use studyguide_api::{
    db::{MemoryStore, PracticeStore},
    models::{NewProblem, ProblemType, SessionType},
};
use studyguide_core::confidence::MasteryState;
use uuid::Uuid;

mod common;

use common::{USER_ID, delete, get, post_json, put_json, store_app};

fn user() -> Uuid {
    USER_ID.parse().unwrap()
}

fn short_answer(question: &str, answer: &str, hints: &[&str]) -> NewProblem {
    NewProblem {
        question_text: question.to_string(),
        problem_type: ProblemType::ShortAnswer,
        options: None,
        correct_answer: answer.to_string(),
        explanation: Some("Because.".to_string()),
        hints: hints.iter().map(|h| h.to_string()).collect(),
        hint_penalty: 0.15,
    }
}

struct Seeded {
    guide_id: i64,
    topic_id: i64,
    problem_ids: Vec<i64>,
    session_id: i64,
}

/// One guide with one topic holding three problems, and an open session.
async fn seed(store: &MemoryStore) -> Seeded {
    let guide = store
        .create_study_guide(user(), "Biology", Some("bio.pdf"))
        .await
        .unwrap();
    let topic = store
        .create_topic(guide.id, "Cells", None, None)
        .await
        .unwrap();
    let problems = store
        .create_problems(
            topic.id,
            &[
                short_answer("Powerhouse of the cell?", "mitochondria | mitochondrion", &["Energy", "Starts with M"]),
                short_answer("Site of photosynthesis?", "chloroplast,", &[]),
                short_answer("Holds the DNA?", "nucleus", &[]),
            ],
        )
        .await
        .unwrap();
    let session = store
        .start_session(user(), guide.id, SessionType::Normal, None, None)
        .await
        .unwrap();
    Seeded {
        guide_id: guide.id,
        topic_id: topic.id,
        problem_ids: problems.iter().map(|p| p.id).collect(),
        session_id: session.id,
    }
}

#[tokio::test]
async fn test_submit_answer_grades_and_records() {
    let app = store_app();
    let seeded = seed(&app.store).await;

    let (status, body) = app
        .send(post_json(
            &format!("/sessions/{}/attempts", seeded.session_id),
            json!({"problemId": seeded.problem_ids[0], "userAnswer": " Mitochondrion. ", "hintsUsed": 1, "confidenceRating": 3}),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_correct"], true);
    assert_eq!(body["user_answer"], "Mitochondrion.");
    assert_eq!(body["explanation"], "Because.");
    assert_eq!(
        app.store
            .session_problem_ids(seeded.session_id)
            .await
            .unwrap(),
        vec![seeded.problem_ids[0]]
    );
}

#[tokio::test]
async fn test_blank_answer_does_not_match_trailing_separator() {
    let app = store_app();
    let seeded = seed(&app.store).await;

    let (status, body) = app
        .send(post_json(
            &format!("/sessions/{}/attempts", seeded.session_id),
            json!({"problemId": seeded.problem_ids[1], "userAnswer": ""}),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_correct"], false);
}

#[tokio::test]
async fn test_submit_answer_unknown_session_or_problem() {
    let app = store_app();
    let seeded = seed(&app.store).await;

    let (status, body) = app
        .send(post_json(
            "/sessions/9999/attempts",
            json!({"problemId": seeded.problem_ids[0], "userAnswer": "x"}),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Practice session not found");

    let (status, body) = app
        .send(post_json(
            &format!("/sessions/{}/attempts", seeded.session_id),
            json!({"problemId": 9999, "userAnswer": "x"}),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Problem not found");
}

#[tokio::test]
async fn test_ended_session_rejects_end_and_submit() {
    let app = store_app();
    let seeded = seed(&app.store).await;
    let attempts_uri = format!("/sessions/{}/attempts", seeded.session_id);
    let end_uri = format!("/sessions/{}/end", seeded.session_id);

    app.send(post_json(
        &attempts_uri,
        json!({"problemId": seeded.problem_ids[0], "userAnswer": "mitochondria"}),
    ))
    .await;
    app.send(post_json(
        &attempts_uri,
        json!({"problemId": seeded.problem_ids[2], "userAnswer": "ribosome"}),
    ))
    .await;

    let (status, summary) = app.send(post_json(&end_uri, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_problems"], 2);
    assert_eq!(summary["correct_answers"], 1);
    assert_eq!(summary["accuracy"], 50.0);

    let (status, body) = app.send(post_json(&end_uri, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "This session has already ended");

    let (status, body) = app
        .send(post_json(
            &attempts_uri,
            json!({"problemId": seeded.problem_ids[1], "userAnswer": "chloroplast"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "This session has already ended");

    let (status, _) = app.send(post_json("/sessions/9999/end", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_hint_lookup() {
    let app = store_app();
    let seeded = seed(&app.store).await;
    let problem_id = seeded.problem_ids[0];

    let (status, body) = app
        .send(get(&format!("/problems/{problem_id}/hints/1")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"hint": "Starts with M", "penalty": 0.15, "totalHints": 2})
    );

    let (status, body) = app
        .send(get(&format!("/problems/{problem_id}/hints/2")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("out of range"));

    let (status, _) = app.send(get("/problems/9999/hints/0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_select_problem_skips_attempted_and_excluded() {
    let app = store_app();
    let seeded = seed(&app.store).await;
    app.store
        .record_attempt(seeded.session_id, seeded.problem_ids[0], "x", false, 0, None)
        .await
        .unwrap();

    for _ in 0..20 {
        let (status, body) = app
            .send(post_json(
                "/select-problem",
                json!({
                    "userId": USER_ID,
                    "sessionId": seeded.session_id,
                    "topicIds": [seeded.topic_id],
                    "excludeProblemIds": [seeded.problem_ids[1]]
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["problem"]["id"], seeded.problem_ids[2]);
        assert_eq!(body["topic"]["name"], "Cells");
        assert!(body["problem"].get("correct_answer").is_none());
    }

    let (status, body) = app
        .send(post_json(
            "/select-problem",
            json!({
                "userId": USER_ID,
                "sessionId": seeded.session_id,
                "topicIds": [seeded.topic_id],
                "excludeProblemIds": [seeded.problem_ids[1], seeded.problem_ids[2]]
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No problems available");
}

#[tokio::test]
async fn test_select_problem_unknown_topic() {
    let app = store_app();
    let seeded = seed(&app.store).await;

    let (status, body) = app
        .send(post_json(
            "/select-problem",
            json!({"userId": USER_ID, "sessionId": seeded.session_id, "topicIds": [9999]}),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Topic not found");
}

#[tokio::test]
async fn test_update_confidence_upserts_one_row() {
    let app = store_app();
    let seeded = seed(&app.store).await;
    let payload = json!({"userId": USER_ID, "topicId": seeded.topic_id, "wasCorrect": true, "userConfidence": "3"});

    let (status, first) = app.send(post_json("/update-confidence", payload.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["progress"]["problems_attempted"], 1);
    assert_eq!(first["progress"]["problems_correct"], 1);
    assert!(first["progress"]["last_practiced"].is_string());
    let confidence = first["progress"]["current_confidence"].as_f64().unwrap();
    assert!(confidence > 0.0 && confidence <= 1.0);

    let (status, second) = app.send(post_json("/update-confidence", payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["progress"]["id"], first["progress"]["id"]);
    assert_eq!(second["progress"]["problems_attempted"], 2);
    assert!(second["progress"]["current_confidence"].as_f64().unwrap() > confidence);

    let rows = app.store.guide_progress(user(), seeded.guide_id).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_start_session_checks_guide_contents() {
    let app = store_app();
    let seeded = seed(&app.store).await;
    let empty = app
        .store
        .create_study_guide(user(), "Empty", None)
        .await
        .unwrap();

    let (status, body) = app
        .send(post_json(
            "/sessions",
            json!({"userId": USER_ID, "studyGuideId": empty.id}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Study guide has no topics");

    let (status, _) = app
        .send(post_json(
            "/sessions",
            json!({"userId": USER_ID, "studyGuideId": 9999}),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(post_json(
            "/sessions",
            json!({"userId": USER_ID, "studyGuideId": seeded.guide_id, "sessionType": "exam_mode", "timeLimitMinutes": 30}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_timed"], true);
    assert_eq!(body["session_type"], "exam_mode");
}

#[tokio::test]
async fn test_session_history_and_weak_topics() {
    let app = store_app();
    let seeded = seed(&app.store).await;
    app.store
        .record_attempt(seeded.session_id, seeded.problem_ids[0], "x", false, 0, None)
        .await
        .unwrap();
    let strong = app
        .store
        .create_topic(seeded.guide_id, "Genetics", None, None)
        .await
        .unwrap();
    for (topic_id, confidence) in [(seeded.topic_id, 0.2), (strong.id, 0.9)] {
        let state = MasteryState {
            current_confidence: confidence,
            problems_attempted: 4,
            problems_correct: 2,
            mastered: confidence >= 0.75,
        };
        app.store
            .upsert_topic_progress(user(), topic_id, &state)
            .await
            .unwrap();
    }

    let (status, history) = app
        .send(get(&format!("/sessions?userId={USER_ID}&studyGuideId={}", seeded.guide_id)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["id"], seeded.session_id);
    assert_eq!(history[0]["study_guide_title"], "Biology");
    assert_eq!(history[0]["attempt_count"], 1);

    let (status, weak) = app.send(get(&format!("/weak-topics?userId={USER_ID}"))).await;
    assert_eq!(status, StatusCode::OK);
    let weak = weak.as_array().unwrap();
    assert_eq!(weak.len(), 1);
    assert_eq!(weak[0]["topic_id"], seeded.topic_id);
    assert_eq!(weak[0]["topic_name"], "Cells");

    let (status, progress) = app
        .send(get(&format!(
            "/study-guides/{}/progress?userId={USER_ID}",
            seeded.guide_id
        )))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress[0]["topic_name"], "Cells");
    assert_eq!(progress[0]["accuracy"], 50.0);
    assert_eq!(progress[1]["topic_name"], "Genetics");
}

#[tokio::test]
async fn test_study_guide_library_lifecycle() {
    let app = store_app();

    let (status, guide) = app
        .send(post_json(
            "/study-guides",
            json!({"userId": USER_ID, "title": "  Chemistry ", "originalFilename": "chem.pdf"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(guide["title"], "Chemistry");
    let guide_id = guide["id"].as_i64().unwrap();

    let (status, body) = app
        .send(post_json(
            "/study-guides",
            json!({"userId": USER_ID, "title": "  "}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Title is required");

    let (status, renamed) = app
        .send(put_json(
            &format!("/study-guides/{guide_id}"),
            json!({"title": "Organic Chemistry"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["title"], "Organic Chemistry");
    assert_eq!(renamed["original_filename"], "chem.pdf");

    let (status, topic) = app
        .send(post_json(
            &format!("/study-guides/{guide_id}/topics"),
            json!({"name": "Alkanes"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(topic["order_index"], 1);
    let topic_id = topic["id"].as_i64().unwrap();

    let (status, problem) = app
        .send(post_json(
            &format!("/topics/{topic_id}/problems"),
            json!({
                "questionText": "Simplest alkane?",
                "problemType": "multiple_choice",
                "options": ["Methane", "Ethane"],
                "correctAnswer": "methane"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(problem["correct_answer"], "Methane");

    let (status, guides) = app
        .send(get(&format!("/study-guides?userId={USER_ID}")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(guides.as_array().unwrap().len(), 1);

    let (status, _) = app.send(delete(&format!("/study-guides/{guide_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(get(&format!("/study-guides/{guide_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send(get(&format!("/topics/{topic_id}/problems"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_problems_are_all_or_nothing() {
    let app = store_app();
    let seeded = seed(&app.store).await;
    let uri = format!("/topics/{}/problems/bulk", seeded.topic_id);
    let valid = json!({
        "questionText": "Cell membrane is made of?",
        "problemType": "short_answer",
        "correctAnswer": "phospholipids"
    });
    let invalid = json!({
        "questionText": "Pick one",
        "problemType": "multiple_choice",
        "correctAnswer": "A"
    });

    let (status, body) = app
        .send(post_json(&uri, json!({"problems": [valid.clone(), invalid]})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Problem 1: Options are required for multiple choice problems"
    );
    let (_, listed) = app
        .send(get(&format!("/topics/{}/problems", seeded.topic_id)))
        .await;
    assert_eq!(listed.as_array().unwrap().len(), 3);

    let (status, created) = app
        .send(post_json(&uri, json!({"problems": [valid.clone(), valid]})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.as_array().unwrap().len(), 2);

    let (_, listed) = app
        .send(get(&format!("/topics/{}/problems", seeded.topic_id)))
        .await;
    let listed: &Vec<Value> = listed.as_array().unwrap();
    assert_eq!(listed.len(), 5);
    assert!(listed.iter().all(|p| p.get("correct_answer").is_none()));

    let (status, body) = app.send(post_json(&uri, json!({"problems": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "At least one problem is required");
}

#[tokio::test]
async fn test_topic_update_and_delete() {
    let app = store_app();
    let seeded = seed(&app.store).await;

    let (status, topic) = app
        .send(put_json(
            &format!("/topics/{}", seeded.topic_id),
            json!({"description": "Cell structure", "orderIndex": 4}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(topic["name"], "Cells");
    assert_eq!(topic["description"], "Cell structure");
    assert_eq!(topic["order_index"], 4);

    let (status, body) = app
        .send(delete(&format!("/problems/{}", seeded.problem_ids[2])))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Problem deleted successfully");

    let (status, _) = app
        .send(delete(&format!("/topics/{}", seeded.topic_id)))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .send(delete(&format!("/topics/{}", seeded.topic_id)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(
        app.store
            .get_problem(seeded.problem_ids[0])
            .await
            .unwrap()
            .is_none()
    );
}
