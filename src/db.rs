use std::collections::BTreeSet;
use std::io::Read;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::gpa::{CourseGroup, GroupSummary, RecordSet};
use crate::models::{
    CgpaHistoryEntry, CourseRecord, GradingScale, ImportRow, RemovedCourse, StoredCourse,
    UserRecord,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn register_user(pool: &PgPool, full_name: &str, email: &str) -> anyhow::Result<Uuid> {
    let email = normalize_email(email)?;
    let full_name = full_name.trim();
    anyhow::ensure!(!full_name.is_empty(), "name must not be empty");

    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO grademaster.users (id, full_name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(&email)
    .fetch_one(pool)
    .await?
    .get("id");

    info!(user = %id, email = %email, "user registered");
    Ok(id)
}

pub async fn find_user(pool: &PgPool, email: &str) -> anyhow::Result<UserRecord> {
    let email = normalize_email(email)?;
    let row = sqlx::query(
        "SELECT id, full_name, email FROM grademaster.users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no user registered with email {email}"))?;

    Ok(UserRecord {
        id: row.get("id"),
        full_name: row.get("full_name"),
        email: row.get("email"),
    })
}

/// Every course a user owns, oldest first.
pub async fn fetch_courses(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<StoredCourse>> {
    let mut conn = pool.acquire().await?;
    fetch_user_courses(&mut conn, user_id).await
}

pub async fn load_record_set(pool: &PgPool, user_id: Uuid) -> anyhow::Result<RecordSet> {
    let mut conn = pool.acquire().await?;
    let (courses, set) = current_record_set(&mut conn, user_id).await?;
    debug!(user = %user_id, courses = courses.len(), "record set loaded");
    Ok(set)
}

pub async fn add_course(
    pool: &PgPool,
    user_id: Uuid,
    scale: GradingScale,
    record: &CourseRecord,
) -> anyhow::Result<GroupSummary> {
    let mut tx = pool.begin().await?;
    lock_user(&mut tx, user_id).await?;

    let (_, mut set) = current_record_set(&mut tx, user_id).await?;
    let summary = set.add_course(scale, record.clone())?.summary();

    let group_id = upsert_group(&mut tx, user_id, scale).await?;
    insert_course(&mut tx, group_id, record, None).await?;
    persist_group(&mut tx, user_id, scale, set.group(scale)).await?;

    tx.commit().await?;
    info!(
        user = %user_id,
        scale = %scale,
        course = %record.name,
        average = summary.rounded(),
        "course added"
    );
    Ok(summary)
}

pub async fn remove_course(
    pool: &PgPool,
    user_id: Uuid,
    course_id: Uuid,
) -> anyhow::Result<Option<RemovedCourse>> {
    let mut tx = pool.begin().await?;
    lock_user(&mut tx, user_id).await?;

    let (courses, mut set) = current_record_set(&mut tx, user_id).await?;
    let Some((scale, index)) = locate_course(&courses, course_id) else {
        warn!(user = %user_id, course = %course_id, "course not found");
        return Ok(None);
    };
    let record = set
        .remove_course(scale, index)?
        .context("course missing from its group")?;

    sqlx::query("DELETE FROM grademaster.courses WHERE id = $1")
        .bind(course_id)
        .execute(&mut *tx)
        .await?;

    let remaining = persist_group(&mut tx, user_id, scale, set.group(scale)).await?;
    tx.commit().await?;

    info!(user = %user_id, scale = %scale, course = %record.name, "course removed");
    Ok(Some(RemovedCourse {
        scale,
        record,
        remaining,
    }))
}

/// Moves all courses of the `from` group under `to`. Fails without writing
/// anything if a grade has no meaning on the target scale.
pub async fn rescale(
    pool: &PgPool,
    user_id: Uuid,
    from: GradingScale,
    to: GradingScale,
) -> anyhow::Result<bool> {
    let mut tx = pool.begin().await?;
    lock_user(&mut tx, user_id).await?;

    let (_, mut set) = current_record_set(&mut tx, user_id).await?;
    if !set.rescale(from, to)? {
        return Ok(false);
    }

    let source_id = find_group(&mut tx, user_id, from)
        .await?
        .context("source group missing")?;
    let target_id = upsert_group(&mut tx, user_id, to).await?;

    sqlx::query("UPDATE grademaster.courses SET group_id = $1 WHERE group_id = $2")
        .bind(target_id)
        .bind(source_id)
        .execute(&mut *tx)
        .await?;

    persist_group(&mut tx, user_id, from, set.group(from)).await?;
    let summary = persist_group(&mut tx, user_id, to, set.group(to)).await?;
    tx.commit().await?;

    info!(
        user = %user_id,
        from = %from,
        to = %to,
        average = summary.map(|s| s.rounded()).unwrap_or_default(),
        "group rescaled"
    );
    Ok(true)
}

pub async fn fetch_history(
    pool: &PgPool,
    user_id: Uuid,
    scale: Option<GradingScale>,
    limit: i64,
) -> anyhow::Result<Vec<CgpaHistoryEntry>> {
    let mut query = String::from(
        "SELECT average, scale, semester, recorded_at \
         FROM grademaster.cgpa_history \
         WHERE user_id = $1",
    );

    if scale.is_some() {
        query.push_str(" AND scale = $3");
    }
    query.push_str(" ORDER BY seq DESC LIMIT $2");

    let mut rows = sqlx::query(&query).bind(user_id).bind(limit.max(1));
    if let Some(value) = scale {
        rows = rows.bind(value.as_str());
    }

    let records = rows.fetch_all(pool).await?;
    let mut history = Vec::with_capacity(records.len());

    for row in records {
        history.push(CgpaHistoryEntry {
            average: row.get("average"),
            scale: row.get::<String, _>("scale").parse()?,
            timestamp: row.get::<DateTime<Utc>, _>("recorded_at"),
            semester: row.get("semester"),
        });
    }

    Ok(history)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = read_import_rows(file)?;
    store_rows(pool, &rows).await
}

/// Parses and validates every CSV row up front so a single bad line
/// rejects the whole file.
pub fn read_import_rows<R: Read>(reader: R) -> anyhow::Result<Vec<ImportRow>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        scale: String,
        course_name: String,
        credit: i64,
        grade: String,
        semester: String,
        level: String,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed CSV row on line {line}"))?;
        let scale: GradingScale = row
            .scale
            .parse()
            .with_context(|| format!("line {line}"))?;
        let record = CourseRecord::new(
            &row.course_name,
            row.credit,
            &row.grade,
            scale,
            &row.semester,
            &row.level,
        )
        .with_context(|| format!("line {line}"))?;

        rows.push(ImportRow {
            full_name: row.full_name.trim().to_string(),
            email: normalize_email(&row.email).with_context(|| format!("line {line}"))?,
            scale,
            record,
            source_key: row
                .source_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
        });
    }

    Ok(rows)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let demo = [
        ("seed-001", "5.0", "MTH101", 3, "A", "2023/2024-1", "100"),
        ("seed-002", "5.0", "PHY101", 2, "C", "2023/2024-1", "100"),
        ("seed-003", "5.0", "CHM101", 3, "B", "2023/2024-1", "100"),
        ("seed-004", "5.0", "GST102", 2, "E", "2023/2024-2", "100"),
        ("seed-005", "5.0", "CSC102", 4, "A", "2023/2024-2", "100"),
        ("seed-006", "4.0", "ECO201", 3, "B", "2024/2025-1", "200"),
        ("seed-007", "4.0", "ACC201", 2, "A", "2024/2025-1", "200"),
    ];

    let mut rows = Vec::with_capacity(demo.len());
    for (source_key, scale, course, credit, grade, semester, level) in demo {
        let scale: GradingScale = scale.parse()?;
        rows.push(ImportRow {
            full_name: "Adaeze Okafor".to_string(),
            email: "adaeze.okafor@grademaster.app".to_string(),
            scale,
            record: CourseRecord::new(course, credit, grade, scale, semester, level)?,
            source_key: Some(source_key.to_string()),
        });
    }

    store_rows(pool, &rows).await?;
    Ok(())
}

/// Writes validated rows in one transaction and recomputes every group the
/// rows added courses to. Rows whose `source_key` already exists are skipped.
async fn store_rows(pool: &PgPool, rows: &[ImportRow]) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    let mut locked: BTreeSet<Uuid> = BTreeSet::new();
    let mut upserted: BTreeSet<(Uuid, GradingScale)> = BTreeSet::new();
    let mut touched: BTreeSet<(Uuid, GradingScale)> = BTreeSet::new();
    let mut inserted = 0usize;

    for row in rows {
        let user_id: Uuid = sqlx::query(
            r#"
            INSERT INTO grademaster.users (id, full_name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.full_name)
        .bind(&row.email)
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        if locked.insert(user_id) {
            lock_user(&mut tx, user_id).await?;
        }

        let group_id = upsert_group(&mut tx, user_id, row.scale).await?;
        upserted.insert((user_id, row.scale));
        if insert_course(&mut tx, group_id, &row.record, row.source_key.as_deref()).await? {
            inserted += 1;
            touched.insert((user_id, row.scale));
        }
    }

    for user_id in locked {
        let (_, set) = current_record_set(&mut tx, user_id).await?;
        for scale in [GradingScale::FourPoint, GradingScale::FivePoint] {
            if touched.contains(&(user_id, scale)) {
                persist_group(&mut tx, user_id, scale, set.group(scale)).await?;
            }
        }
    }

    // Groups this import created for rows that were all duplicates stay
    // empty; drop them without a history entry.
    for (user_id, scale) in untouched_groups(&upserted, &touched) {
        sqlx::query(
            r#"
            DELETE FROM grademaster.course_groups g
            WHERE g.user_id = $1 AND g.scale = $2
              AND NOT EXISTS (SELECT 1 FROM grademaster.courses c WHERE c.group_id = g.id)
            "#,
        )
        .bind(user_id)
        .bind(scale.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(rows = rows.len(), inserted, "courses stored");
    Ok(inserted)
}

/// Groups upserted during an import that received no new course.
fn untouched_groups(
    upserted: &BTreeSet<(Uuid, GradingScale)>,
    touched: &BTreeSet<(Uuid, GradingScale)>,
) -> Vec<(Uuid, GradingScale)> {
    upserted.difference(touched).copied().collect()
}

/// Scale and position within that scale's group of a stored course.
/// Courses are expected in the order `fetch_user_courses` returns them.
fn locate_course(courses: &[StoredCourse], course_id: Uuid) -> Option<(GradingScale, usize)> {
    let scale = courses.iter().find(|course| course.id == course_id)?.scale;
    let index = courses
        .iter()
        .filter(|course| course.scale == scale)
        .position(|course| course.id == course_id)?;
    Some((scale, index))
}

/// Serialises writers on one user's record set.
async fn lock_user(conn: &mut PgConnection, user_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("SELECT id FROM grademaster.users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .with_context(|| format!("user {user_id} does not exist"))?;
    Ok(())
}

async fn find_group(
    conn: &mut PgConnection,
    user_id: Uuid,
    scale: GradingScale,
) -> anyhow::Result<Option<Uuid>> {
    let row = sqlx::query(
        "SELECT id FROM grademaster.course_groups WHERE user_id = $1 AND scale = $2",
    )
    .bind(user_id)
    .bind(scale.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| row.get("id")))
}

async fn upsert_group(
    conn: &mut PgConnection,
    user_id: Uuid,
    scale: GradingScale,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO grademaster.course_groups (id, user_id, scale)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, scale) DO UPDATE
        SET updated_at = now()
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(scale.as_str())
    .fetch_one(&mut *conn)
    .await?
    .get("id");

    Ok(id)
}

/// Returns `false` when the row was skipped as a duplicate `source_key`.
async fn insert_course(
    conn: &mut PgConnection,
    group_id: Uuid,
    record: &CourseRecord,
    source_key: Option<&str>,
) -> anyhow::Result<bool> {
    let credit = i32::try_from(record.credit_units)
        .with_context(|| format!("credit units {} out of range", record.credit_units))?;

    let result = sqlx::query(
        r#"
        INSERT INTO grademaster.courses
        (id, group_id, course_name, credit, grade, semester, level, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(group_id)
    .bind(&record.name)
    .bind(credit)
    .bind(record.grade.as_str())
    .bind(&record.semester)
    .bind(&record.level)
    .bind(source_key)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn fetch_user_courses(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> anyhow::Result<Vec<StoredCourse>> {
    let records = sqlx::query(
        r#"
        SELECT c.id, c.course_name, c.credit, c.grade, c.semester, c.level, g.scale
        FROM grademaster.courses c
        JOIN grademaster.course_groups g ON g.id = c.group_id
        WHERE g.user_id = $1
        ORDER BY c.seq
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut courses = Vec::with_capacity(records.len());
    for row in records {
        let scale: GradingScale = row.get::<String, _>("scale").parse()?;
        courses.push(StoredCourse {
            id: row.get("id"),
            scale,
            record: course_from_row(&row, scale)?,
        });
    }

    Ok(courses)
}

/// A user's stored courses and the record set built from them. Writers call
/// this after `lock_user` so the set cannot change underneath them.
async fn current_record_set(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> anyhow::Result<(Vec<StoredCourse>, RecordSet)> {
    let courses = fetch_user_courses(conn, user_id).await?;
    let set = RecordSet::from_records(
        courses
            .iter()
            .map(|course| (course.scale, course.record.clone())),
    )
    .context("stored courses failed validation")?;
    Ok((courses, set))
}

/// Writes a group's derived average and appends a history entry. `None`
/// means the group no longer exists in the record set: its row is deleted
/// and a `0.0` entry is appended if a row was actually there.
async fn persist_group(
    conn: &mut PgConnection,
    user_id: Uuid,
    scale: GradingScale,
    group: Option<&CourseGroup>,
) -> anyhow::Result<Option<GroupSummary>> {
    let Some(group) = group else {
        let deleted = sqlx::query(
            "DELETE FROM grademaster.course_groups WHERE user_id = $1 AND scale = $2",
        )
        .bind(user_id)
        .bind(scale.as_str())
        .execute(&mut *conn)
        .await?;

        if deleted.rows_affected() > 0 {
            append_history(conn, user_id, scale, 0.0, None).await?;
            debug!(user = %user_id, scale = %scale, "empty group dropped");
        }
        return Ok(None);
    };

    let summary = group.summary();
    let total_credits = i64::try_from(summary.total_credits)?;
    let semester = group
        .courses()
        .last()
        .map(|course| course.semester.clone())
        .filter(|semester| !semester.is_empty());

    sqlx::query(
        r#"
        UPDATE grademaster.course_groups
        SET grade_point = $1, total_credits = $2, updated_at = now()
        WHERE user_id = $3 AND scale = $4
        "#,
    )
    .bind(summary.average)
    .bind(total_credits)
    .bind(user_id)
    .bind(scale.as_str())
    .execute(&mut *conn)
    .await?;

    append_history(conn, user_id, scale, summary.average, semester).await?;
    Ok(Some(summary))
}

async fn append_history(
    conn: &mut PgConnection,
    user_id: Uuid,
    scale: GradingScale,
    average: f64,
    semester: Option<String>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO grademaster.cgpa_history (id, user_id, scale, average, semester)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(scale.as_str())
    .bind(average)
    .bind(semester)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn course_from_row(row: &sqlx::postgres::PgRow, scale: GradingScale) -> anyhow::Result<CourseRecord> {
    let name: String = row.get("course_name");
    let credit: i32 = row.get("credit");
    let grade: String = row.get("grade");
    let semester: String = row.get("semester");
    let level: String = row.get("level");

    CourseRecord::new(&name, i64::from(credit), &grade, scale, &semester, &level)
        .with_context(|| format!("stored course {name:?} is invalid"))
}

fn normalize_email(email: &str) -> anyhow::Result<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    anyhow::ensure!(valid, "invalid email address {email:?}");
    Ok(email)
}
