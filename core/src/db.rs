use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::error::TrainerError;
use crate::models::{
    ContactInfo, ContactInfoInput, Exercise, ExerciseInput, ExerciseSet, ExerciseSetInput,
    HomeContent, HomeContentInput, MacroType, Meal, MealFood, MealFoodInput, MealInput, MealPlan,
    NewMealPlan, NewTestimonial, NewUser, NewVideo, NewWeightRecord, NewWorkoutPlan, Role,
    Testimonial, UpdateMealPlan, UpdateTestimonial, UpdateUser, UpdateVideo, UpdateWorkoutPlan,
    User, Video, WeightRecord, WorkoutDay, WorkoutDayInput, WorkoutPlan, sum_meal_calories,
};

const DATE_FMT: &str = "%Y-%m-%d";

const USER_COLUMNS: &str =
    "id, username, email, full_name, phone, role, avatar, start_date, created_at, updated_at";

const TESTIMONIAL_COLUMNS: &str =
    "id, name, content, rating, avatar, before_image, after_image, created_at, updated_at";

const VIDEO_COLUMNS: &str = "id, title, youtube_id, description, category, created_at, updated_at";

const WEIGHT_COLUMNS: &str = "id, client_id, weight, date, notes, created_at";

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MacroType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
    }
}

impl ToSql for MacroType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => NaiveDate::parse_from_str(&raw, DATE_FMT)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn now() -> String {
    Local::now().to_rfc3339()
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)
            .context("Failed to enable foreign keys")?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    #[allow(clippy::too_many_lines)]
    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    username TEXT NOT NULL UNIQUE,
                    email TEXT NOT NULL COLLATE NOCASE UNIQUE,
                    password_hash TEXT NOT NULL,
                    full_name TEXT NOT NULL,
                    phone TEXT,
                    role TEXT NOT NULL CHECK (role IN ('admin', 'client')),
                    avatar TEXT,
                    start_date TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS workout_plans (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    client_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    week_number INTEGER NOT NULL CHECK (week_number >= 1),
                    start_date TEXT NOT NULL,
                    created_by TEXT NOT NULL CHECK (created_by IN ('admin', 'client')),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS workout_days (
                    id TEXT PRIMARY KEY,
                    workout_plan_id TEXT NOT NULL REFERENCES workout_plans(id) ON DELETE CASCADE,
                    day_name TEXT NOT NULL,
                    day_order INTEGER NOT NULL,
                    is_rest_day INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS exercises (
                    id TEXT PRIMARY KEY,
                    workout_day_id TEXT NOT NULL REFERENCES workout_days(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    exercise_order INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS exercise_sets (
                    id TEXT PRIMARY KEY,
                    exercise_id TEXT NOT NULL REFERENCES exercises(id) ON DELETE CASCADE,
                    set_number INTEGER NOT NULL,
                    reps INTEGER NOT NULL,
                    reality INTEGER,
                    weight REAL,
                    volume REAL
                );

                CREATE TABLE IF NOT EXISTS meal_plans (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    client_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    total_calories INTEGER NOT NULL DEFAULT 0,
                    notes TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS meals (
                    id TEXT PRIMARY KEY,
                    meal_plan_id TEXT NOT NULL REFERENCES meal_plans(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    total_calories INTEGER NOT NULL DEFAULT 0,
                    meal_order INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS meal_foods (
                    id TEXT PRIMARY KEY,
                    meal_id TEXT NOT NULL REFERENCES meals(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    macro_type TEXT NOT NULL CHECK (macro_type IN ('Carb', 'Pro', 'Fat')),
                    calories INTEGER NOT NULL,
                    notes TEXT,
                    food_order INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS weight_records (
                    id TEXT PRIMARY KEY,
                    client_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    weight REAL NOT NULL CHECK (weight > 0),
                    date TEXT NOT NULL,
                    notes TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS testimonials (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    content TEXT NOT NULL,
                    rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                    avatar TEXT,
                    before_image TEXT,
                    after_image TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS videos (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    youtube_id TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    category TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS contact_info (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    phone TEXT NOT NULL,
                    facebook TEXT NOT NULL,
                    zalo TEXT NOT NULL,
                    email TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS home_content (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    hero_title TEXT NOT NULL,
                    hero_subtitle TEXT NOT NULL,
                    hero_image TEXT,
                    about_text TEXT NOT NULL,
                    about_image TEXT,
                    services_title TEXT NOT NULL,
                    services TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_workout_plans_client ON workout_plans(client_id);
                CREATE INDEX IF NOT EXISTS idx_workout_days_plan ON workout_days(workout_plan_id);
                CREATE INDEX IF NOT EXISTS idx_exercises_day ON exercises(workout_day_id);
                CREATE INDEX IF NOT EXISTS idx_exercise_sets_exercise ON exercise_sets(exercise_id);
                CREATE INDEX IF NOT EXISTS idx_meal_plans_client ON meal_plans(client_id);
                CREATE INDEX IF NOT EXISTS idx_meals_plan ON meals(meal_plan_id);
                CREATE INDEX IF NOT EXISTS idx_meal_foods_meal ON meal_foods(meal_id);
                CREATE INDEX IF NOT EXISTS idx_weight_records_client_date ON weight_records(client_id, date);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            full_name: row.get(3)?,
            phone: row.get(4)?,
            role: row.get(5)?,
            avatar: row.get(6)?,
            start_date: optional_date_column(row, 7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn testimonial_from_row(row: &rusqlite::Row) -> rusqlite::Result<Testimonial> {
        Ok(Testimonial {
            id: row.get(0)?,
            name: row.get(1)?,
            content: row.get(2)?,
            rating: row.get(3)?,
            avatar: row.get(4)?,
            before_image: row.get(5)?,
            after_image: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn video_from_row(row: &rusqlite::Row) -> rusqlite::Result<Video> {
        Ok(Video {
            id: row.get(0)?,
            title: row.get(1)?,
            youtube_id: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn weight_record_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeightRecord> {
        Ok(WeightRecord {
            id: row.get(0)?,
            client_id: row.get(1)?,
            weight: row.get(2)?,
            date: date_column(row, 3)?,
            notes: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn delete_row(&self, table: &str, entity: &'static str, id: &str) -> Result<()> {
        let rows = self
            .conn
            .execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
        if rows == 0 {
            bail!(TrainerError::not_found(entity, id));
        }
        Ok(())
    }

    // --- Users ---

    pub fn insert_user(&self, user: &NewUser, password_hash: &str) -> Result<User> {
        self.ensure_user_field_free("username", &user.username, None)?;
        self.ensure_user_field_free("email", &user.email, None)?;
        let id = new_id();
        let now = now();
        self.conn.execute(
            "INSERT INTO users (id, username, email, password_hash, full_name, phone, role, avatar, start_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                user.username,
                user.email,
                password_hash,
                user.full_name,
                user.phone,
                user.role,
                user.avatar,
                user.start_date.map(format_date),
                now,
                now,
            ],
        )?;
        self.get_user(&id)
    }

    fn ensure_user_field_free(&self, column: &str, value: &str, except: Option<&str>) -> Result<()> {
        let taken: bool = self.conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM users WHERE {column} = ?1 AND (?2 IS NULL OR id != ?2))"
            ),
            params![value, except],
            |row| row.get(0),
        )?;
        if taken {
            bail!(TrainerError::invalid(format!(
                "{column} '{value}' is already taken"
            )));
        }
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<User> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                Self::user_from_row,
            )
            .optional()?
            .ok_or_else(|| TrainerError::not_found("User", id).into())
    }

    pub fn ensure_user_exists(&self, id: &str) -> Result<()> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            bail!(TrainerError::not_found("User", id));
        }
        Ok(())
    }

    /// Look a user up by username, or by email ignoring case, and return
    /// the stored password hash alongside.
    pub fn find_user_credentials(&self, identifier: &str) -> Result<Option<(User, String)>> {
        let found = self
            .conn
            .query_row(
                &format!(
                    "SELECT {USER_COLUMNS}, password_hash FROM users
                     WHERE username = ?1 OR email = ?1
                     ORDER BY username = ?1 DESC
                     LIMIT 1"
                ),
                params![identifier],
                |row| Ok((Self::user_from_row(row)?, row.get::<_, String>(10)?)),
            )
            .optional()?;
        Ok(found)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, rowid DESC"
        ))?;
        let users = stmt
            .query_map([], Self::user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn admin_exists(&self) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')",
            [],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn update_user(
        &self,
        id: &str,
        update: &UpdateUser,
        password_hash: Option<&str>,
    ) -> Result<User> {
        self.get_user(id)?;
        if let Some(ref username) = update.username {
            self.ensure_user_field_free("username", username, Some(id))?;
        }
        if let Some(ref email) = update.email {
            self.ensure_user_field_free("email", email, Some(id))?;
        }

        let tx = self.conn.unchecked_transaction()?;
        let now = now();
        if let Some(ref username) = update.username {
            set_column(&tx, "users", "username", username, id, &now)?;
        }
        if let Some(ref email) = update.email {
            set_column(&tx, "users", "email", email, id, &now)?;
        }
        if let Some(ref full_name) = update.full_name {
            set_column(&tx, "users", "full_name", full_name, id, &now)?;
        }
        if let Some(ref phone) = update.phone {
            set_column(&tx, "users", "phone", phone, id, &now)?;
        }
        if let Some(role) = update.role {
            set_column(&tx, "users", "role", &role, id, &now)?;
        }
        if let Some(ref avatar) = update.avatar {
            set_column(&tx, "users", "avatar", avatar, id, &now)?;
        }
        if let Some(start_date) = update.start_date {
            set_column(&tx, "users", "start_date", &start_date.map(format_date), id, &now)?;
        }
        if let Some(hash) = password_hash {
            set_column(&tx, "users", "password_hash", &hash, id, &now)?;
        }
        tx.commit()?;

        self.get_user(id)
    }

    pub fn delete_user(&self, id: &str) -> Result<()> {
        self.delete_row("users", "User", id)
    }

    // --- Workout plans ---

    // Columns:
    // 0: p.id, 1: p.name, 2: p.client_id, 3: p.week_number, 4: p.start_date,
    // 5: p.created_by, 6: p.created_at, 7: p.updated_at,
    // 8: d.id, 9: d.day_name, 10: d.day_order, 11: d.is_rest_day,
    // 12: e.id, 13: e.name, 14: e.exercise_order,
    // 15: s.id, 16: s.set_number, 17: s.reps, 18: s.reality, 19: s.weight, 20: s.volume
    fn load_workout_plans(
        &self,
        plan_id: Option<&str>,
        client_id: Option<&str>,
    ) -> Result<Vec<WorkoutPlan>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name, p.client_id, p.week_number, p.start_date, p.created_by,
                    p.created_at, p.updated_at,
                    d.id, d.day_name, d.day_order, d.is_rest_day,
                    e.id, e.name, e.exercise_order,
                    s.id, s.set_number, s.reps, s.reality, s.weight, s.volume
             FROM workout_plans p
             LEFT JOIN workout_days d ON d.workout_plan_id = p.id
             LEFT JOIN exercises e ON e.workout_day_id = d.id
             LEFT JOIN exercise_sets s ON s.exercise_id = e.id
             WHERE (?1 IS NULL OR p.id = ?1) AND (?2 IS NULL OR p.client_id = ?2)
             ORDER BY p.created_at DESC, p.rowid DESC,
                      d.day_order, d.id, e.exercise_order, e.id, s.set_number",
        )?;
        let mut rows = stmt.query(params![plan_id, client_id])?;

        let mut plans: Vec<WorkoutPlan> = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            if plans.last().is_none_or(|p| p.id != id) {
                plans.push(WorkoutPlan {
                    id,
                    name: row.get(1)?,
                    client_id: row.get(2)?,
                    week_number: row.get(3)?,
                    start_date: date_column(row, 4)?,
                    created_by: row.get(5)?,
                    created_at: row.get(6)?,
                    updated_at: row.get(7)?,
                    days: Vec::new(),
                });
            }
            let Some(plan) = plans.last_mut() else {
                continue;
            };

            let Some(day_id) = row.get::<_, Option<String>>(8)? else {
                continue;
            };
            if plan.days.last().is_none_or(|d| d.id != day_id) {
                plan.days.push(WorkoutDay {
                    id: day_id,
                    day_name: row.get(9)?,
                    day_order: row.get(10)?,
                    is_rest_day: row.get(11)?,
                    exercises: Vec::new(),
                });
            }
            let Some(day) = plan.days.last_mut() else {
                continue;
            };

            let Some(exercise_id) = row.get::<_, Option<String>>(12)? else {
                continue;
            };
            if day.exercises.last().is_none_or(|e| e.id != exercise_id) {
                day.exercises.push(Exercise {
                    id: exercise_id,
                    name: row.get(13)?,
                    exercise_order: row.get(14)?,
                    sets: Vec::new(),
                });
            }
            let Some(exercise) = day.exercises.last_mut() else {
                continue;
            };

            let Some(set_id) = row.get::<_, Option<String>>(15)? else {
                continue;
            };
            exercise.sets.push(ExerciseSet {
                id: set_id,
                set_number: row.get(16)?,
                reps: row.get(17)?,
                reality: row.get(18)?,
                weight: row.get(19)?,
                volume: row.get(20)?,
            });
        }
        Ok(plans)
    }

    /// All plans, or one client's, newest first with the full day tree.
    pub fn list_workout_plans(&self, client_id: Option<&str>) -> Result<Vec<WorkoutPlan>> {
        self.load_workout_plans(None, client_id)
    }

    pub fn get_workout_plan(&self, id: &str) -> Result<WorkoutPlan> {
        self.load_workout_plans(Some(id), None)?
            .into_iter()
            .next()
            .ok_or_else(|| TrainerError::not_found("Workout plan", id).into())
    }

    pub fn insert_workout_plan(&self, plan: &NewWorkoutPlan) -> Result<WorkoutPlan> {
        self.ensure_user_exists(&plan.client_id)?;
        let id = new_id();
        let now = now();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO workout_plans (id, name, client_id, week_number, start_date, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                plan.name,
                plan.client_id,
                plan.week_number,
                format_date(plan.start_date),
                plan.created_by,
                now,
                now,
            ],
        )?;
        sync_days(&tx, &id, &plan.days)?;
        tx.commit().context("Failed to commit workout plan")?;

        self.get_workout_plan(&id)
    }

    pub fn update_workout_plan(&self, id: &str, update: &UpdateWorkoutPlan) -> Result<WorkoutPlan> {
        self.get_workout_plan(id)?;
        if let Some(ref client_id) = update.client_id {
            self.ensure_user_exists(client_id)?;
        }

        let tx = self.conn.unchecked_transaction()?;
        let now = now();
        if let Some(ref name) = update.name {
            set_column(&tx, "workout_plans", "name", name, id, &now)?;
        }
        if let Some(ref client_id) = update.client_id {
            set_column(&tx, "workout_plans", "client_id", client_id, id, &now)?;
        }
        if let Some(week_number) = update.week_number {
            set_column(&tx, "workout_plans", "week_number", &week_number, id, &now)?;
        }
        if let Some(start_date) = update.start_date {
            set_column(&tx, "workout_plans", "start_date", &format_date(start_date), id, &now)?;
        }
        if let Some(ref days) = update.days {
            sync_days(&tx, id, days)?;
            touch(&tx, "workout_plans", id, &now)?;
        }
        tx.commit().context("Failed to commit workout plan")?;

        self.get_workout_plan(id)
    }

    pub fn delete_workout_plan(&self, id: &str) -> Result<()> {
        self.delete_row("workout_plans", "Workout plan", id)
    }

    pub fn max_week_number(&self, client_id: &str) -> Result<Option<i64>> {
        let max = self.conn.query_row(
            "SELECT MAX(week_number) FROM workout_plans WHERE client_id = ?1",
            params![client_id],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    // --- Meal plans ---

    // Columns:
    // 0: p.id, 1: p.name, 2: p.client_id, 3: p.total_calories, 4: p.notes,
    // 5: p.created_at, 6: p.updated_at,
    // 7: m.id, 8: m.name, 9: m.total_calories, 10: m.meal_order,
    // 11: f.id, 12: f.name, 13: f.macro_type, 14: f.calories, 15: f.notes, 16: f.food_order
    fn load_meal_plans(&self, plan_id: Option<&str>, client_id: Option<&str>) -> Result<Vec<MealPlan>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name, p.client_id, p.total_calories, p.notes, p.created_at, p.updated_at,
                    m.id, m.name, m.total_calories, m.meal_order,
                    f.id, f.name, f.macro_type, f.calories, f.notes, f.food_order
             FROM meal_plans p
             LEFT JOIN meals m ON m.meal_plan_id = p.id
             LEFT JOIN meal_foods f ON f.meal_id = m.id
             WHERE (?1 IS NULL OR p.id = ?1) AND (?2 IS NULL OR p.client_id = ?2)
             ORDER BY p.created_at DESC, p.rowid DESC, m.meal_order, m.id, f.food_order",
        )?;
        let mut rows = stmt.query(params![plan_id, client_id])?;

        let mut plans: Vec<MealPlan> = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            if plans.last().is_none_or(|p| p.id != id) {
                plans.push(MealPlan {
                    id,
                    name: row.get(1)?,
                    client_id: row.get(2)?,
                    total_calories: row.get(3)?,
                    notes: row.get(4)?,
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                    meals: Vec::new(),
                });
            }
            let Some(plan) = plans.last_mut() else {
                continue;
            };

            let Some(meal_id) = row.get::<_, Option<String>>(7)? else {
                continue;
            };
            if plan.meals.last().is_none_or(|m| m.id != meal_id) {
                plan.meals.push(Meal {
                    id: meal_id,
                    name: row.get(8)?,
                    total_calories: row.get(9)?,
                    meal_order: row.get(10)?,
                    foods: Vec::new(),
                });
            }
            let Some(meal) = plan.meals.last_mut() else {
                continue;
            };

            let Some(food_id) = row.get::<_, Option<String>>(11)? else {
                continue;
            };
            meal.foods.push(MealFood {
                id: food_id,
                name: row.get(12)?,
                macro_type: row.get(13)?,
                calories: row.get(14)?,
                notes: row.get(15)?,
                food_order: row.get(16)?,
            });
        }
        Ok(plans)
    }

    pub fn list_meal_plans(&self, client_id: Option<&str>) -> Result<Vec<MealPlan>> {
        self.load_meal_plans(None, client_id)
    }

    pub fn get_meal_plan(&self, id: &str) -> Result<MealPlan> {
        self.load_meal_plans(Some(id), None)?
            .into_iter()
            .next()
            .ok_or_else(|| TrainerError::not_found("Meal plan", id).into())
    }

    pub fn insert_meal_plan(&self, plan: &NewMealPlan) -> Result<MealPlan> {
        self.ensure_user_exists(&plan.client_id)?;
        let id = new_id();
        let now = now();
        let total_calories = plan
            .total_calories
            .unwrap_or_else(|| sum_meal_calories(&plan.meals));

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO meal_plans (id, name, client_id, total_calories, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, plan.name, plan.client_id, total_calories, plan.notes, now, now],
        )?;
        sync_meals(&tx, &id, &plan.meals)?;
        tx.commit().context("Failed to commit meal plan")?;

        self.get_meal_plan(&id)
    }

    pub fn update_meal_plan(&self, id: &str, update: &UpdateMealPlan) -> Result<MealPlan> {
        self.get_meal_plan(id)?;
        if let Some(ref client_id) = update.client_id {
            self.ensure_user_exists(client_id)?;
        }

        let tx = self.conn.unchecked_transaction()?;
        let now = now();
        if let Some(ref name) = update.name {
            set_column(&tx, "meal_plans", "name", name, id, &now)?;
        }
        if let Some(ref client_id) = update.client_id {
            set_column(&tx, "meal_plans", "client_id", client_id, id, &now)?;
        }
        if let Some(ref notes) = update.notes {
            set_column(&tx, "meal_plans", "notes", notes, id, &now)?;
        }
        let total_calories = update
            .total_calories
            .or_else(|| update.meals.as_deref().map(sum_meal_calories));
        if let Some(total_calories) = total_calories {
            set_column(&tx, "meal_plans", "total_calories", &total_calories, id, &now)?;
        }
        if let Some(ref meals) = update.meals {
            sync_meals(&tx, id, meals)?;
            touch(&tx, "meal_plans", id, &now)?;
        }
        tx.commit().context("Failed to commit meal plan")?;

        self.get_meal_plan(id)
    }

    pub fn delete_meal_plan(&self, id: &str) -> Result<()> {
        self.delete_row("meal_plans", "Meal plan", id)
    }

    // --- Weight records ---

    pub fn insert_weight_record(&self, record: &NewWeightRecord) -> Result<WeightRecord> {
        self.ensure_user_exists(&record.client_id)?;
        let id = new_id();
        self.conn.execute(
            "INSERT INTO weight_records (id, client_id, weight, date, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                record.client_id,
                record.weight,
                format_date(record.date),
                record.notes,
                now(),
            ],
        )?;
        self.get_weight_record(&id)
    }

    /// Insert every record or none of them.
    pub fn insert_weight_records(&self, records: &[NewWeightRecord]) -> Result<Vec<WeightRecord>> {
        let tx = self.conn.unchecked_transaction()?;
        let created = records
            .iter()
            .map(|record| self.insert_weight_record(record))
            .collect::<Result<Vec<_>>>()?;
        tx.commit().context("Failed to commit weight records")?;
        Ok(created)
    }

    pub fn get_weight_record(&self, id: &str) -> Result<WeightRecord> {
        self.conn
            .query_row(
                &format!("SELECT {WEIGHT_COLUMNS} FROM weight_records WHERE id = ?1"),
                params![id],
                Self::weight_record_from_row,
            )
            .optional()?
            .ok_or_else(|| TrainerError::not_found("Weight record", id).into())
    }

    /// Newest date first.
    pub fn list_weight_records(&self, client_id: Option<&str>) -> Result<Vec<WeightRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WEIGHT_COLUMNS} FROM weight_records
             WHERE ?1 IS NULL OR client_id = ?1
             ORDER BY date DESC, created_at DESC, rowid DESC"
        ))?;
        let records = stmt
            .query_map(params![client_id], Self::weight_record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn has_weight_record(&self, client_id: &str, date: NaiveDate, weight: f64) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM weight_records
                           WHERE client_id = ?1 AND date = ?2 AND ABS(weight - ?3) < 1e-6)",
            params![client_id, format_date(date), weight],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn delete_weight_record(&self, id: &str) -> Result<()> {
        self.delete_row("weight_records", "Weight record", id)
    }

    // --- Testimonials ---

    pub fn insert_testimonial(&self, testimonial: &NewTestimonial) -> Result<Testimonial> {
        let id = new_id();
        let now = now();
        self.conn.execute(
            "INSERT INTO testimonials (id, name, content, rating, avatar, before_image, after_image, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                testimonial.name,
                testimonial.content,
                testimonial.rating,
                testimonial.avatar,
                testimonial.before_image,
                testimonial.after_image,
                now,
                now,
            ],
        )?;
        self.get_testimonial(&id)
    }

    pub fn get_testimonial(&self, id: &str) -> Result<Testimonial> {
        self.conn
            .query_row(
                &format!("SELECT {TESTIMONIAL_COLUMNS} FROM testimonials WHERE id = ?1"),
                params![id],
                Self::testimonial_from_row,
            )
            .optional()?
            .ok_or_else(|| TrainerError::not_found("Testimonial", id).into())
    }

    pub fn list_testimonials(&self) -> Result<Vec<Testimonial>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TESTIMONIAL_COLUMNS} FROM testimonials ORDER BY created_at DESC, rowid DESC"
        ))?;
        let testimonials = stmt
            .query_map([], Self::testimonial_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(testimonials)
    }

    pub fn update_testimonial(&self, id: &str, update: &UpdateTestimonial) -> Result<Testimonial> {
        self.get_testimonial(id)?;

        let tx = self.conn.unchecked_transaction()?;
        let now = now();
        if let Some(ref name) = update.name {
            set_column(&tx, "testimonials", "name", name, id, &now)?;
        }
        if let Some(ref content) = update.content {
            set_column(&tx, "testimonials", "content", content, id, &now)?;
        }
        if let Some(rating) = update.rating {
            set_column(&tx, "testimonials", "rating", &rating, id, &now)?;
        }
        if let Some(ref avatar) = update.avatar {
            set_column(&tx, "testimonials", "avatar", avatar, id, &now)?;
        }
        if let Some(ref before_image) = update.before_image {
            set_column(&tx, "testimonials", "before_image", before_image, id, &now)?;
        }
        if let Some(ref after_image) = update.after_image {
            set_column(&tx, "testimonials", "after_image", after_image, id, &now)?;
        }
        tx.commit()?;

        self.get_testimonial(id)
    }

    pub fn delete_testimonial(&self, id: &str) -> Result<()> {
        self.delete_row("testimonials", "Testimonial", id)
    }

    // --- Videos ---

    pub fn insert_video(&self, video: &NewVideo) -> Result<Video> {
        let id = new_id();
        let now = now();
        self.conn.execute(
            "INSERT INTO videos (id, title, youtube_id, description, category, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                video.title,
                video.youtube_id,
                video.description,
                video.category,
                now,
                now,
            ],
        )?;
        self.get_video(&id)
    }

    pub fn get_video(&self, id: &str) -> Result<Video> {
        self.conn
            .query_row(
                &format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?1"),
                params![id],
                Self::video_from_row,
            )
            .optional()?
            .ok_or_else(|| TrainerError::not_found("Video", id).into())
    }

    pub fn list_videos(&self) -> Result<Vec<Video>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos ORDER BY created_at DESC, rowid DESC"
        ))?;
        let videos = stmt
            .query_map([], Self::video_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(videos)
    }

    pub fn update_video(&self, id: &str, update: &UpdateVideo) -> Result<Video> {
        self.get_video(id)?;

        let tx = self.conn.unchecked_transaction()?;
        let now = now();
        if let Some(ref title) = update.title {
            set_column(&tx, "videos", "title", title, id, &now)?;
        }
        if let Some(ref youtube_id) = update.youtube_id {
            set_column(&tx, "videos", "youtube_id", youtube_id, id, &now)?;
        }
        if let Some(ref description) = update.description {
            set_column(&tx, "videos", "description", description, id, &now)?;
        }
        if let Some(ref category) = update.category {
            set_column(&tx, "videos", "category", category, id, &now)?;
        }
        tx.commit()?;

        self.get_video(id)
    }

    pub fn delete_video(&self, id: &str) -> Result<()> {
        self.delete_row("videos", "Video", id)
    }

    // --- Singleton settings ---

    /// The stored contact row, or the built-in default when none was saved.
    pub fn get_contact_info(&self) -> Result<ContactInfo> {
        let info = self
            .conn
            .query_row(
                "SELECT phone, facebook, zalo, email, updated_at FROM contact_info LIMIT 1",
                [],
                |row| {
                    Ok(ContactInfo {
                        phone: row.get(0)?,
                        facebook: row.get(1)?,
                        zalo: row.get(2)?,
                        email: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(info.unwrap_or_default())
    }

    pub fn upsert_contact_info(&self, info: &ContactInfoInput) -> Result<ContactInfo> {
        self.conn.execute(
            "INSERT INTO contact_info (id, phone, facebook, zalo, email, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                phone = excluded.phone,
                facebook = excluded.facebook,
                zalo = excluded.zalo,
                email = excluded.email,
                updated_at = excluded.updated_at",
            params![info.phone, info.facebook, info.zalo, info.email, now()],
        )?;
        self.get_contact_info()
    }

    /// The stored landing-page content, or the built-in default when none was saved.
    pub fn get_home_content(&self) -> Result<HomeContent> {
        let content = self
            .conn
            .query_row(
                "SELECT hero_title, hero_subtitle, hero_image, about_text, about_image,
                        services_title, services, updated_at
                 FROM home_content LIMIT 1",
                [],
                |row| {
                    let services_json: String = row.get(6)?;
                    let services = serde_json::from_str(&services_json).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e))
                    })?;
                    Ok(HomeContent {
                        hero_title: row.get(0)?,
                        hero_subtitle: row.get(1)?,
                        hero_image: row.get(2)?,
                        about_text: row.get(3)?,
                        about_image: row.get(4)?,
                        services_title: row.get(5)?,
                        services,
                        updated_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(content.unwrap_or_default())
    }

    pub fn upsert_home_content(&self, content: &HomeContentInput) -> Result<HomeContent> {
        let services = serde_json::to_string(&content.services)?;
        self.conn.execute(
            "INSERT INTO home_content (id, hero_title, hero_subtitle, hero_image, about_text, about_image, services_title, services, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                hero_title = excluded.hero_title,
                hero_subtitle = excluded.hero_subtitle,
                hero_image = excluded.hero_image,
                about_text = excluded.about_text,
                about_image = excluded.about_image,
                services_title = excluded.services_title,
                services = excluded.services,
                updated_at = excluded.updated_at",
            params![
                content.hero_title,
                content.hero_subtitle,
                content.hero_image,
                content.about_text,
                content.about_image,
                content.services_title,
                services,
                now(),
            ],
        )?;
        self.get_home_content()
    }
}

// --- Nested writes ---
//
// Each level matches input ids against the current children of the same
// parent. Matches are updated in place, everything else is inserted with a
// fresh id, and children absent from the input are deleted. Order columns
// follow input order starting at 1.

fn set_column(
    conn: &Connection,
    table: &str,
    column: &str,
    value: &dyn ToSql,
    id: &str,
    now: &str,
) -> Result<()> {
    conn.execute(
        &format!("UPDATE {table} SET {column} = ?1, updated_at = ?2 WHERE id = ?3"),
        params![value, now, id],
    )?;
    Ok(())
}

fn touch(conn: &Connection, table: &str, id: &str, now: &str) -> Result<()> {
    conn.execute(
        &format!("UPDATE {table} SET updated_at = ?1 WHERE id = ?2"),
        params![now, id],
    )?;
    Ok(())
}

fn child_ids(conn: &Connection, table: &str, parent_column: &str, parent_id: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("SELECT id FROM {table} WHERE {parent_column} = ?1"))?;
    let ids = stmt
        .query_map(params![parent_id], |row| row.get(0))?
        .collect::<Result<HashSet<String>, _>>()?;
    Ok(ids)
}

/// Claim an input id if it names an existing child not already claimed.
fn claim(existing: &HashSet<String>, kept: &mut HashSet<String>, id: Option<&str>) -> Option<String> {
    let id = id.filter(|id| existing.contains(*id) && !kept.contains(*id))?;
    kept.insert(id.to_string());
    Some(id.to_string())
}

fn delete_stale(
    conn: &Connection,
    table: &str,
    existing: &HashSet<String>,
    kept: &HashSet<String>,
) -> Result<()> {
    for id in existing.difference(kept) {
        conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
    }
    Ok(())
}

fn sync_days(conn: &Connection, plan_id: &str, days: &[WorkoutDayInput]) -> Result<()> {
    let existing = child_ids(conn, "workout_days", "workout_plan_id", plan_id)?;
    let mut kept = HashSet::new();
    for (order, day) in (1_i64..).zip(days) {
        let day_id = if let Some(id) = claim(&existing, &mut kept, day.id.as_deref()) {
            conn.execute(
                "UPDATE workout_days SET day_name = ?1, day_order = ?2, is_rest_day = ?3 WHERE id = ?4",
                params![day.day_name, order, day.is_rest_day, id],
            )?;
            id
        } else {
            let id = new_id();
            conn.execute(
                "INSERT INTO workout_days (id, workout_plan_id, day_name, day_order, is_rest_day)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, plan_id, day.day_name, order, day.is_rest_day],
            )?;
            id
        };
        sync_exercises(conn, &day_id, &day.exercises)?;
    }
    delete_stale(conn, "workout_days", &existing, &kept)
}

fn sync_exercises(conn: &Connection, day_id: &str, exercises: &[ExerciseInput]) -> Result<()> {
    let existing = child_ids(conn, "exercises", "workout_day_id", day_id)?;
    let mut kept = HashSet::new();
    for (order, exercise) in (1_i64..).zip(exercises) {
        let exercise_id = if let Some(id) = claim(&existing, &mut kept, exercise.id.as_deref()) {
            conn.execute(
                "UPDATE exercises SET name = ?1, exercise_order = ?2 WHERE id = ?3",
                params![exercise.name, order, id],
            )?;
            id
        } else {
            let id = new_id();
            conn.execute(
                "INSERT INTO exercises (id, workout_day_id, name, exercise_order) VALUES (?1, ?2, ?3, ?4)",
                params![id, day_id, exercise.name, order],
            )?;
            id
        };
        sync_sets(conn, &exercise_id, &exercise.sets)?;
    }
    delete_stale(conn, "exercises", &existing, &kept)
}

fn sync_sets(conn: &Connection, exercise_id: &str, sets: &[ExerciseSetInput]) -> Result<()> {
    let existing = child_ids(conn, "exercise_sets", "exercise_id", exercise_id)?;
    let mut kept = HashSet::new();
    for (set_number, set) in (1_i64..).zip(sets) {
        if let Some(id) = claim(&existing, &mut kept, set.id.as_deref()) {
            conn.execute(
                "UPDATE exercise_sets SET set_number = ?1, reps = ?2, reality = ?3, weight = ?4, volume = ?5
                 WHERE id = ?6",
                params![set_number, set.reps, set.reality, set.weight, set.volume, id],
            )?;
        } else {
            conn.execute(
                "INSERT INTO exercise_sets (id, exercise_id, set_number, reps, reality, weight, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![new_id(), exercise_id, set_number, set.reps, set.reality, set.weight, set.volume],
            )?;
        }
    }
    delete_stale(conn, "exercise_sets", &existing, &kept)
}

fn sync_meals(conn: &Connection, plan_id: &str, meals: &[MealInput]) -> Result<()> {
    let existing = child_ids(conn, "meals", "meal_plan_id", plan_id)?;
    let mut kept = HashSet::new();
    for (order, meal) in (1_i64..).zip(meals) {
        let calories = meal.resolved_calories();
        let meal_id = if let Some(id) = claim(&existing, &mut kept, meal.id.as_deref()) {
            conn.execute(
                "UPDATE meals SET name = ?1, total_calories = ?2, meal_order = ?3 WHERE id = ?4",
                params![meal.name, calories, order, id],
            )?;
            id
        } else {
            let id = new_id();
            conn.execute(
                "INSERT INTO meals (id, meal_plan_id, name, total_calories, meal_order)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, plan_id, meal.name, calories, order],
            )?;
            id
        };
        sync_foods(conn, &meal_id, &meal.foods)?;
    }
    delete_stale(conn, "meals", &existing, &kept)
}

fn sync_foods(conn: &Connection, meal_id: &str, foods: &[MealFoodInput]) -> Result<()> {
    let existing = child_ids(conn, "meal_foods", "meal_id", meal_id)?;
    let mut kept = HashSet::new();
    for (order, food) in (1_i64..).zip(foods) {
        if let Some(id) = claim(&existing, &mut kept, food.id.as_deref()) {
            conn.execute(
                "UPDATE meal_foods SET name = ?1, macro_type = ?2, calories = ?3, notes = ?4, food_order = ?5
                 WHERE id = ?6",
                params![food.name, food.macro_type, food.calories, food.notes, order, id],
            )?;
        } else {
            conn.execute(
                "INSERT INTO meal_foods (id, meal_id, name, macro_type, calories, notes, food_order)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![new_id(), meal_id, food.name, food.macro_type, food.calories, food.notes, order],
            )?;
        }
    }
    delete_stale(conn, "meal_foods", &existing, &kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_not_found;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn new_user(username: &str, role: Role) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{username}@phinpt.com"),
            password: "secret1".to_string(),
            full_name: format!("{username} Nguyen"),
            phone: None,
            role,
            avatar: None,
            start_date: Some(date("2024-01-15")),
        }
    }

    fn client(db: &Database, username: &str) -> User {
        db.insert_user(&new_user(username, Role::Client), "hash").unwrap()
    }

    fn set(reps: i64, weight: f64) -> ExerciseSetInput {
        ExerciseSetInput {
            id: None,
            reps,
            reality: None,
            weight: Some(weight),
            volume: None,
        }
    }

    fn exercise(name: &str, sets: Vec<ExerciseSetInput>) -> ExerciseInput {
        ExerciseInput {
            id: None,
            name: name.to_string(),
            sets,
        }
    }

    fn day(name: &str, exercises: Vec<ExerciseInput>) -> WorkoutDayInput {
        WorkoutDayInput {
            id: None,
            day_name: name.to_string(),
            is_rest_day: exercises.is_empty(),
            exercises,
        }
    }

    fn sample_plan(client_id: &str) -> NewWorkoutPlan {
        NewWorkoutPlan {
            name: "Strength Block".to_string(),
            client_id: client_id.to_string(),
            week_number: 1,
            start_date: date("2024-03-04"),
            created_by: Role::Admin,
            days: vec![
                day(
                    "Monday",
                    vec![
                        exercise("Squat", vec![set(8, 60.0), set(8, 65.0), set(6, 70.0)]),
                        exercise("Bench Press", vec![set(10, 40.0)]),
                    ],
                ),
                day("Tuesday", vec![]),
                day("Wednesday", vec![exercise("Deadlift", vec![set(5, 90.0)])]),
            ],
        }
    }

    fn food(name: &str, macro_type: MacroType, calories: i64) -> MealFoodInput {
        MealFoodInput {
            id: None,
            name: name.to_string(),
            macro_type,
            calories,
            notes: None,
        }
    }

    fn sample_meal_plan(client_id: &str) -> NewMealPlan {
        NewMealPlan {
            name: "Cutting".to_string(),
            client_id: client_id.to_string(),
            total_calories: None,
            notes: Some("No sugar".to_string()),
            meals: vec![
                MealInput {
                    id: None,
                    name: "Breakfast".to_string(),
                    total_calories: None,
                    foods: vec![
                        food("Oats", MacroType::Carb, 300),
                        food("Eggs", MacroType::Pro, 150),
                    ],
                },
                MealInput {
                    id: None,
                    name: "Lunch".to_string(),
                    total_calories: Some(700),
                    foods: vec![food("Chicken", MacroType::Pro, 400)],
                },
            ],
        }
    }

    #[test]
    fn test_insert_and_get_user() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");

        assert_eq!(user.username, "minh");
        assert_eq!(user.role, Role::Client);
        assert_eq!(user.start_date, Some(date("2024-01-15")));

        let fetched = db.get_user(&user.id).unwrap();
        assert_eq!(fetched, user);
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let db = Database::open_in_memory().unwrap();
        client(&db, "minh");
        let mut dup = new_user("minh", Role::Client);
        dup.email = "other@phinpt.com".to_string();
        let err = db.insert_user(&dup, "hash").unwrap_err();
        assert_eq!(err.to_string(), "username 'minh' is already taken");
    }

    #[test]
    fn test_duplicate_email_ignores_case() {
        let db = Database::open_in_memory().unwrap();
        client(&db, "minh");
        let mut dup = new_user("lan", Role::Client);
        dup.email = "MINH@phinpt.com".to_string();
        assert!(db.insert_user(&dup, "hash").is_err());
    }

    #[test]
    fn test_find_user_credentials() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");

        let (by_name, hash) = db.find_user_credentials("minh").unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
        assert_eq!(hash, "hash");

        let (by_email, _) = db.find_user_credentials("Minh@PhinPT.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);

        assert!(db.find_user_credentials("nobody").unwrap().is_none());
    }

    #[test]
    fn test_update_user_fields() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");

        let updated = db
            .update_user(
                &user.id,
                &UpdateUser {
                    full_name: Some("Tran Minh".to_string()),
                    phone: Some(Some("0909".to_string())),
                    start_date: Some(None),
                    ..Default::default()
                },
                Some("new-hash"),
            )
            .unwrap();
        assert_eq!(updated.full_name, "Tran Minh");
        assert_eq!(updated.phone.as_deref(), Some("0909"));
        assert!(updated.start_date.is_none());
        assert_eq!(updated.username, "minh");

        let (_, hash) = db.find_user_credentials("minh").unwrap().unwrap();
        assert_eq!(hash, "new-hash");
    }

    #[test]
    fn test_update_user_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .update_user("missing", &UpdateUser::default(), None)
            .unwrap_err();
        assert!(is_not_found(&err));
    }

    #[test]
    fn test_admin_exists() {
        let db = Database::open_in_memory().unwrap();
        client(&db, "minh");
        assert!(!db.admin_exists().unwrap());
        db.insert_user(&new_user("phi", Role::Admin), "hash").unwrap();
        assert!(db.admin_exists().unwrap());
    }

    #[test]
    fn test_insert_workout_plan_dense_orders() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");
        let plan = db.insert_workout_plan(&sample_plan(&user.id)).unwrap();

        assert_eq!(plan.days.len(), 3);
        for (i, day) in plan.days.iter().enumerate() {
            assert_eq!(day.day_order, i as i64 + 1);
            for (j, ex) in day.exercises.iter().enumerate() {
                assert_eq!(ex.exercise_order, j as i64 + 1);
                for (k, s) in ex.sets.iter().enumerate() {
                    assert_eq!(s.set_number, k as i64 + 1);
                }
            }
        }
        assert_eq!(plan.days[0].day_name, "Monday");
        assert_eq!(plan.days[0].exercises[0].name, "Squat");
        assert_eq!(plan.days[0].exercises[0].sets[2].weight, Some(70.0));
        assert!(plan.days[1].is_rest_day);
        assert!(plan.days[1].exercises.is_empty());
        assert_eq!(plan.created_by, Role::Admin);
    }

    #[test]
    fn test_insert_workout_plan_unknown_client() {
        let db = Database::open_in_memory().unwrap();
        let err = db.insert_workout_plan(&sample_plan("ghost")).unwrap_err();
        assert!(is_not_found(&err));
        assert_eq!(count(&db, "workout_plans"), 0);
    }

    #[test]
    fn test_list_workout_plans_newest_first_and_by_client() {
        let db = Database::open_in_memory().unwrap();
        let a = client(&db, "minh");
        let b = client(&db, "lan");
        let first = db.insert_workout_plan(&sample_plan(&a.id)).unwrap();
        let second = db.insert_workout_plan(&sample_plan(&b.id)).unwrap();

        let all = db.list_workout_plans(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);
        assert_eq!(all[1].id, first.id);
        assert_eq!(all[1].days.len(), 3);

        let only_a = db.list_workout_plans(Some(&a.id)).unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0], first);
    }

    #[test]
    fn test_update_workout_plan_diffs_children() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");
        let plan = db.insert_workout_plan(&sample_plan(&user.id)).unwrap();
        let monday = &plan.days[0];
        let squat = &monday.exercises[0];

        // Keep Monday (renamed) with only Squat and its first set, drop the rest, add Friday.
        let days = vec![
            WorkoutDayInput {
                id: Some(monday.id.clone()),
                day_name: "Monday A".to_string(),
                is_rest_day: false,
                exercises: vec![ExerciseInput {
                    id: Some(squat.id.clone()),
                    name: "Back Squat".to_string(),
                    sets: vec![ExerciseSetInput {
                        id: Some(squat.sets[0].id.clone()),
                        reps: 10,
                        reality: Some(9),
                        weight: Some(60.0),
                        volume: Some(540.0),
                    }],
                }],
            },
            day("Friday", vec![exercise("Row", vec![set(12, 30.0)])]),
        ];
        let updated = db
            .update_workout_plan(
                &plan.id,
                &UpdateWorkoutPlan {
                    days: Some(days),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.days.len(), 2);
        assert_eq!(updated.days[0].id, monday.id);
        assert_eq!(updated.days[0].day_name, "Monday A");
        assert_eq!(updated.days[0].exercises.len(), 1);
        assert_eq!(updated.days[0].exercises[0].id, squat.id);
        assert_eq!(updated.days[0].exercises[0].sets.len(), 1);
        assert_eq!(updated.days[0].exercises[0].sets[0].id, squat.sets[0].id);
        assert_eq!(updated.days[0].exercises[0].sets[0].reality, Some(9));
        assert_eq!(updated.days[1].day_name, "Friday");
        assert_eq!(updated.days[1].day_order, 2);

        assert_eq!(count(&db, "workout_days"), 2);
        assert_eq!(count(&db, "exercises"), 2);
        assert_eq!(count(&db, "exercise_sets"), 2);
    }

    #[test]
    fn test_update_workout_plan_foreign_ids_inserted_fresh() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");
        let a = db.insert_workout_plan(&sample_plan(&user.id)).unwrap();
        let b = db.insert_workout_plan(&sample_plan(&user.id)).unwrap();

        // A day id belonging to plan A must not be adopted by plan B.
        let mut stolen = day("Stolen", vec![]);
        stolen.id = Some(a.days[0].id.clone());
        let updated = db
            .update_workout_plan(
                &b.id,
                &UpdateWorkoutPlan {
                    days: Some(vec![stolen]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_ne!(updated.days[0].id, a.days[0].id);
        assert_eq!(db.get_workout_plan(&a.id).unwrap(), a);
    }

    #[test]
    fn test_update_workout_plan_rolls_back_on_failure() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");
        let plan = db.insert_workout_plan(&sample_plan(&user.id)).unwrap();

        let result = db.update_workout_plan(
            &plan.id,
            &UpdateWorkoutPlan {
                name: Some("Renamed".to_string()),
                week_number: Some(0),
                ..Default::default()
            },
        );
        assert!(result.is_err());
        assert_eq!(db.get_workout_plan(&plan.id).unwrap().name, "Strength Block");
    }

    #[test]
    fn test_delete_workout_plan_cascades() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");
        let plan = db.insert_workout_plan(&sample_plan(&user.id)).unwrap();
        assert_eq!(count(&db, "exercise_sets"), 5);

        db.delete_workout_plan(&plan.id).unwrap();
        assert_eq!(count(&db, "workout_days"), 0);
        assert_eq!(count(&db, "exercises"), 0);
        assert_eq!(count(&db, "exercise_sets"), 0);

        let err = db.delete_workout_plan(&plan.id).unwrap_err();
        assert!(is_not_found(&err));
    }

    #[test]
    fn test_delete_user_cascades_to_owned_rows() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");
        db.insert_workout_plan(&sample_plan(&user.id)).unwrap();
        db.insert_meal_plan(&sample_meal_plan(&user.id)).unwrap();
        db.insert_weight_record(&NewWeightRecord {
            client_id: user.id.clone(),
            weight: 72.5,
            date: date("2024-03-01"),
            notes: None,
        })
        .unwrap();

        db.delete_user(&user.id).unwrap();
        assert_eq!(count(&db, "workout_plans"), 0);
        assert_eq!(count(&db, "exercise_sets"), 0);
        assert_eq!(count(&db, "meal_plans"), 0);
        assert_eq!(count(&db, "meal_foods"), 0);
        assert_eq!(count(&db, "weight_records"), 0);
    }

    #[test]
    fn test_max_week_number() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");
        assert_eq!(db.max_week_number(&user.id).unwrap(), None);

        let mut plan = sample_plan(&user.id);
        plan.week_number = 3;
        db.insert_workout_plan(&plan).unwrap();
        plan.week_number = 2;
        db.insert_workout_plan(&plan).unwrap();
        assert_eq!(db.max_week_number(&user.id).unwrap(), Some(3));
    }

    #[test]
    fn test_insert_meal_plan_computes_calories() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");
        let plan = db.insert_meal_plan(&sample_meal_plan(&user.id)).unwrap();

        assert_eq!(plan.meals.len(), 2);
        assert_eq!(plan.meals[0].total_calories, 450);
        assert_eq!(plan.meals[1].total_calories, 700);
        assert_eq!(plan.total_calories, 1150);
        assert_eq!(plan.meals[0].foods[1].macro_type, MacroType::Pro);
        assert_eq!(plan.meals[0].foods[1].food_order, 2);
        assert_eq!(plan.meals[1].meal_order, 2);
        assert_eq!(plan.notes.as_deref(), Some("No sugar"));
    }

    #[test]
    fn test_update_meal_plan_replaces_meals() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");
        let plan = db.insert_meal_plan(&sample_meal_plan(&user.id)).unwrap();
        let lunch = &plan.meals[1];

        let updated = db
            .update_meal_plan(
                &plan.id,
                &UpdateMealPlan {
                    notes: Some(None),
                    meals: Some(vec![MealInput {
                        id: Some(lunch.id.clone()),
                        name: lunch.name.clone(),
                        total_calories: None,
                        foods: vec![MealFoodInput {
                            id: Some(lunch.foods[0].id.clone()),
                            name: "Grilled Chicken".to_string(),
                            macro_type: MacroType::Pro,
                            calories: 350,
                            notes: Some("no skin".to_string()),
                        }],
                    }]),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.meals.len(), 1);
        assert_eq!(updated.meals[0].id, lunch.id);
        assert_eq!(updated.meals[0].meal_order, 1);
        assert_eq!(updated.meals[0].foods[0].id, lunch.foods[0].id);
        assert_eq!(updated.meals[0].total_calories, 350);
        assert_eq!(updated.total_calories, 350);
        assert!(updated.notes.is_none());
        assert_eq!(count(&db, "meal_foods"), 1);
    }

    #[test]
    fn test_weight_records_ordered_by_date_desc() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");
        for (d, w) in [("2024-03-01", 80.0), ("2024-03-15", 78.5), ("2024-03-08", 79.2)] {
            db.insert_weight_record(&NewWeightRecord {
                client_id: user.id.clone(),
                weight: w,
                date: date(d),
                notes: None,
            })
            .unwrap();
        }
        let records = db.list_weight_records(Some(&user.id)).unwrap();
        let dates: Vec<_> = records.iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![date("2024-03-15"), date("2024-03-08"), date("2024-03-01")]
        );
        assert!(db.has_weight_record(&user.id, date("2024-03-08"), 79.2).unwrap());
        assert!(!db.has_weight_record(&user.id, date("2024-03-08"), 79.0).unwrap());
    }

    #[test]
    fn test_weight_batch_rolls_back_on_failure() {
        let db = Database::open_in_memory().unwrap();
        let user = client(&db, "minh");
        let batch = [
            NewWeightRecord {
                client_id: user.id.clone(),
                weight: 80.0,
                date: date("2024-03-01"),
                notes: None,
            },
            NewWeightRecord {
                client_id: "ghost".to_string(),
                weight: 79.0,
                date: date("2024-03-08"),
                notes: None,
            },
        ];
        assert!(db.insert_weight_records(&batch).is_err());
        assert!(db.list_weight_records(None).unwrap().is_empty());

        let stored = db.insert_weight_records(&batch[..1]).unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn test_testimonial_crud() {
        let db = Database::open_in_memory().unwrap();
        let t = db
            .insert_testimonial(&NewTestimonial {
                name: "Lan".to_string(),
                content: "Lost 8kg in 3 months".to_string(),
                rating: 5,
                avatar: None,
                before_image: Some("before.jpg".to_string()),
                after_image: Some("after.jpg".to_string()),
            })
            .unwrap();

        let updated = db
            .update_testimonial(
                &t.id,
                &UpdateTestimonial {
                    rating: Some(4),
                    before_image: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.rating, 4);
        assert!(updated.before_image.is_none());
        assert_eq!(updated.after_image.as_deref(), Some("after.jpg"));

        db.delete_testimonial(&t.id).unwrap();
        assert!(db.list_testimonials().unwrap().is_empty());
    }

    #[test]
    fn test_video_crud() {
        let db = Database::open_in_memory().unwrap();
        let v = db
            .insert_video(&NewVideo {
                title: "Squat form".to_string(),
                youtube_id: "dQw4w9WgXcQ".to_string(),
                description: String::new(),
                category: "Legs".to_string(),
            })
            .unwrap();
        let updated = db
            .update_video(
                &v.id,
                &UpdateVideo {
                    title: Some("Squat form basics".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "Squat form basics");
        assert_eq!(updated.category, "Legs");
        assert_eq!(db.list_videos().unwrap().len(), 1);

        let err = db.get_video("missing").unwrap_err();
        assert!(is_not_found(&err));
    }

    #[test]
    fn test_contact_info_default_then_upsert() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_contact_info().unwrap(), ContactInfo::default());

        let input = ContactInfoInput {
            phone: "0987654321".to_string(),
            facebook: "https://facebook.com/coach".to_string(),
            zalo: "https://zalo.me/0987654321".to_string(),
            email: "coach@phinpt.com".to_string(),
        };
        let saved = db.upsert_contact_info(&input).unwrap();
        assert_eq!(saved.phone, "0987654321");
        assert!(saved.updated_at.is_some());

        db.upsert_contact_info(&input).unwrap();
        assert_eq!(count(&db, "contact_info"), 1);
    }

    #[test]
    fn test_home_content_services_round_trip() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_home_content().unwrap(), HomeContent::default());

        let mut input = HomeContentInput::from(&HomeContent::default());
        input.services = vec!["Online coaching".to_string(), "Bodybuilding prep".to_string()];
        input.hero_image = Some("hero.jpg".to_string());
        let saved = db.upsert_home_content(&input).unwrap();
        assert_eq!(saved.services, input.services);
        assert_eq!(saved.hero_image.as_deref(), Some("hero.jpg"));
        assert_eq!(count(&db, "home_content"), 1);
    }

    #[test]
    fn test_open_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phinpt.db");
        let id = {
            let db = Database::open(&path).unwrap();
            client(&db, "minh").id
        };
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_user(&id).unwrap().username, "minh");
    }
}
