#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Dashboard => "/dashboard",
        }
    }
}

/// Where a flow wants the front-end to go next. `refresh` asks for
/// server-side data to be reloaded after navigating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    pub route: Route,
    pub refresh: bool,
}

impl Navigation {
    pub fn to(route: Route) -> Self {
        Self {
            route,
            refresh: false,
        }
    }

    pub fn refreshed(route: Route) -> Self {
        Self {
            route,
            refresh: true,
        }
    }
}
