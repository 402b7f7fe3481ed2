mod cost;
mod helpers;
mod ingredient;
mod line;
mod recipe;
mod sub;

pub(crate) use cost::cmd_cost;
pub(crate) use ingredient::{
    cmd_ingredient_add, cmd_ingredient_deactivate, cmd_ingredient_list, cmd_ingredient_update,
};
pub(crate) use line::{cmd_line_add, cmd_line_list, cmd_line_remove, cmd_line_reorder, cmd_line_update};
pub(crate) use recipe::{
    RecipeArgs, cmd_recipe_archive, cmd_recipe_create, cmd_recipe_delete, cmd_recipe_fork,
    cmd_recipe_list, cmd_recipe_show, cmd_recipe_status, cmd_recipe_update, cmd_recipe_versions,
};
pub(crate) use sub::{
    cmd_sub_add, cmd_sub_list, cmd_sub_remove, cmd_sub_reorder, cmd_sub_tree, cmd_sub_update,
    cmd_sub_used_in,
};
