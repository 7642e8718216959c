use std::fmt::Formatter;

#[derive(Debug, PartialEq)]
pub enum HmvError {
    /// No credentials file, or it could not be read as JSON
    ConfigMissing,
    EmptyCredentials,
    /// The login exchange completed but the post-login page never rendered
    InvalidCredentials,
    /// The login exchange itself could not complete
    AuthenticationError(String),
    NetworkError(String),
    ErrorStatusCode {
        status_code: u16,
        url: String,
    },
    /// parameters are file path, additional error message
    FileOperationError {
        file_name: String,
        message: String,
    },
    /// Parameter names the page that yielded nothing usable
    NoData(String),
    InvalidPage {
        page: u32,
        total_pages: u32,
    },
    NoMachinesFound,
    /// Parameter is the machine name as typed by the user
    MachineNotFound(String),
    InvalidUrl(String),
    HomeDirectoryNotFound,
    InputError(String),
}

impl HmvError {
    /// Configuration, authentication and validation failures end the process
    /// with a non-zero status. Everything else is reported and the command
    /// returns normally.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HmvError::ConfigMissing
                | HmvError::EmptyCredentials
                | HmvError::InvalidCredentials
                | HmvError::AuthenticationError(_)
                | HmvError::InvalidPage { .. }
                | HmvError::NoMachinesFound
                | HmvError::InvalidUrl(_)
                | HmvError::HomeDirectoryNotFound
                | HmvError::InputError(_)
        )
    }

    pub(crate) fn file_error(file_name: &std::path::Path, e: impl std::fmt::Display) -> Self {
        HmvError::FileOperationError {
            file_name: file_name.to_string_lossy().to_string(),
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for HmvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            HmvError::ConfigMissing => {
                "No configuration found. Please run the 'config' command first.".to_string()
            }
            HmvError::EmptyCredentials => "Username and password cannot be empty.".to_string(),
            HmvError::InvalidCredentials => "Login failed: Invalid credentials.".to_string(),
            HmvError::AuthenticationError(err) => format!("Login error: {err}"),
            HmvError::NetworkError(err) => format!("error connecting to the site. {err}"),
            HmvError::ErrorStatusCode { status_code, url } => {
                format!("server returned an error response. {url} => {status_code}")
            }
            HmvError::FileOperationError { file_name, message } => {
                format!("{message} : {file_name}")
            }
            HmvError::NoData(page) => format!("No {page} data found."),
            HmvError::InvalidPage { total_pages, .. } => {
                format!("Invalid page number. Must be between 1 and {total_pages}.")
            }
            HmvError::NoMachinesFound => "No machines found.".to_string(),
            HmvError::MachineNotFound(name) => format!("Machine '{name}' not found."),
            HmvError::InvalidUrl(url) => format!("Invalid url received : {url}"),
            HmvError::HomeDirectoryNotFound => {
                "could not determine the home directory".to_string()
            }
            HmvError::InputError(err) => format!("error reading input. {err}"),
        };
        write!(f, "{str}")
    }
}

impl std::error::Error for HmvError {}

impl From<reqwest::Error> for HmvError {
    fn from(e: reqwest::Error) -> Self {
        match (e.status(), e.url()) {
            (Some(status), Some(url)) => HmvError::ErrorStatusCode {
                status_code: status.as_u16(),
                url: url.to_string(),
            },
            _ if e.is_timeout() => HmvError::NetworkError(format!("request timed out. {e}")),
            _ => HmvError::NetworkError(e.to_string()),
        }
    }
}

impl From<url::ParseError> for HmvError {
    fn from(e: url::ParseError) -> Self {
        HmvError::InvalidUrl(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HmvError>;
