mod contact;
mod content;
mod helpers;
mod meal_plan;
mod plan;
mod session;
mod testimonial;
mod user;
mod video;
mod weight;

pub(crate) use contact::{ContactChanges, cmd_contact_set, cmd_contact_show};
pub(crate) use content::{
    ContentChanges, cmd_content_add_service, cmd_content_remove_service, cmd_content_set,
    cmd_content_show,
};
pub(crate) use helpers::{json_error, parse_date, password_or_prompt};
pub(crate) use meal_plan::{
    cmd_meal_plan_create, cmd_meal_plan_delete, cmd_meal_plan_list, cmd_meal_plan_show,
};
pub(crate) use plan::{
    cmd_plan_create, cmd_plan_delete, cmd_plan_duplicate, cmd_plan_list, cmd_plan_next_week,
    cmd_plan_show,
};
pub(crate) use session::{cmd_login, cmd_logout, cmd_setup_admin, cmd_whoami};
pub(crate) use testimonial::{cmd_testimonial_add, cmd_testimonial_delete, cmd_testimonial_list};
pub(crate) use user::{cmd_user_add, cmd_user_delete, cmd_user_list, cmd_user_update};
pub(crate) use video::{cmd_video_add, cmd_video_delete, cmd_video_list};
pub(crate) use weight::{cmd_weight_delete, cmd_weight_history, cmd_weight_import, cmd_weight_log};
