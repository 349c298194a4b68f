//! Concrete use cases for the server resources each interactor consumes.
//!
//! Cache keys mirror the request scope so two screens asking for the same
//! list deduplicate against each other.

use crate::api::types::{Course, CourseTab, FileItem, Module, ModuleItem, Page, Quiz, User};

use super::UseCase;

/// All active courses for the current user.
pub struct GetCourses;

impl UseCase for GetCourses {
    type Entity = Course;

    fn cache_key(&self) -> String {
        "courses".into()
    }

    fn path(&self) -> String {
        "api/v1/courses?enrollment_state=active&per_page=100".into()
    }

    fn entity_id(entity: &Course) -> String {
        entity.id.to_string()
    }
}

pub struct GetCourseTabs {
    pub course_id: String,
}

impl UseCase for GetCourseTabs {
    type Entity = CourseTab;

    fn cache_key(&self) -> String {
        format!("courses/{}/tabs", self.course_id)
    }

    fn path(&self) -> String {
        format!("api/v1/courses/{}/tabs", self.course_id)
    }

    fn entity_id(entity: &CourseTab) -> String {
        entity.id.clone()
    }
}

/// Every file in a course, flattened across folders.
pub struct GetCourseFiles {
    pub course_id: String,
}

impl UseCase for GetCourseFiles {
    type Entity = FileItem;

    fn cache_key(&self) -> String {
        format!("courses/{}/files", self.course_id)
    }

    fn path(&self) -> String {
        format!("api/v1/courses/{}/files?per_page=100", self.course_id)
    }

    fn entity_id(entity: &FileItem) -> String {
        entity.id.to_string()
    }
}

pub struct GetModules {
    pub course_id: String,
}

impl UseCase for GetModules {
    type Entity = Module;

    fn cache_key(&self) -> String {
        format!("courses/{}/modules", self.course_id)
    }

    fn path(&self) -> String {
        format!("api/v1/courses/{}/modules?per_page=100", self.course_id)
    }

    fn entity_id(entity: &Module) -> String {
        entity.id.to_string()
    }
}

/// The ordered item sequence of one module.
pub struct GetModuleItems {
    pub course_id: String,
    pub module_id: String,
}

impl UseCase for GetModuleItems {
    type Entity = ModuleItem;

    fn cache_key(&self) -> String {
        format!("courses/{}/modules/{}/items", self.course_id, self.module_id)
    }

    fn path(&self) -> String {
        format!(
            "api/v1/courses/{}/modules/{}/items?include[]=content_details&per_page=100",
            self.course_id, self.module_id
        )
    }

    fn entity_id(entity: &ModuleItem) -> String {
        entity.id.to_string()
    }
}

pub struct GetPage {
    pub course_id: String,
    pub slug: String,
}

impl UseCase for GetPage {
    type Entity = Page;

    fn cache_key(&self) -> String {
        format!("courses/{}/pages/{}", self.course_id, self.slug)
    }

    fn path(&self) -> String {
        format!("api/v1/courses/{}/pages/{}", self.course_id, self.slug)
    }

    fn entity_id(entity: &Page) -> String {
        entity.url.clone()
    }
}

pub struct GetQuiz {
    pub course_id: String,
    pub quiz_id: String,
}

impl UseCase for GetQuiz {
    type Entity = Quiz;

    fn cache_key(&self) -> String {
        format!("courses/{}/quizzes/{}", self.course_id, self.quiz_id)
    }

    fn path(&self) -> String {
        format!("api/v1/courses/{}/quizzes/{}", self.course_id, self.quiz_id)
    }

    fn entity_id(entity: &Quiz) -> String {
        entity.id.to_string()
    }
}

/// Course roster, for the people tab offline.
pub struct GetCourseUsers {
    pub course_id: String,
}

impl UseCase for GetCourseUsers {
    type Entity = User;

    fn cache_key(&self) -> String {
        format!("courses/{}/users", self.course_id)
    }

    fn path(&self) -> String {
        format!(
            "api/v1/courses/{}/users?include[]=avatar_url&per_page=100",
            self.course_id
        )
    }

    fn entity_id(entity: &User) -> String {
        entity.id.to_string()
    }
}
