use super::BackendError;
use crate::profile::ProfileExtra;

pub const USERINFO_HEADER: &str = "subscription-userinfo";
pub const HOME_HEADER: &str = "profile-web-page-url";
pub const DISPOSITION_HEADER: &str = "content-disposition";

/// Parses `upload=1; download=2; total=3; expire=4`. Unknown keys and
/// unparsable values are skipped; `None` if nothing was recognised.
pub fn parse_userinfo(header: &str) -> Option<ProfileExtra> {
  let mut extra = ProfileExtra::default();
  let mut seen = false;

  for part in header.split(';') {
    let Some((key, value)) = part.split_once('=') else {
      continue;
    };
    // Some providers send floats or an empty expire
    let value = value.trim();
    let Some(number) = value
      .parse::<u64>()
      .ok()
      .or_else(|| value.parse::<f64>().ok().map(|f| f.max(0.0) as u64))
    else {
      continue;
    };
    match key.trim().to_ascii_lowercase().as_str() {
      "upload" => extra.upload = number,
      "download" => extra.download = number,
      "total" => extra.total = number,
      "expire" => extra.expire = number,
      _ => continue,
    }
    seen = true;
  }

  seen.then_some(extra)
}

/// File name suggested by `content-disposition`, preferring the RFC 5987
/// `filename*` form.
pub fn parse_filename(header: &str) -> Option<String> {
  let mut plain = None;
  for part in header.split(';') {
    let Some((key, value)) = part.trim().split_once('=') else {
      continue;
    };
    match key.trim().to_ascii_lowercase().as_str() {
      "filename*" => {
        let encoded = value.rsplit("''").next().unwrap_or(value);
        if let Ok(decoded) = urlencoding::decode(encoded.trim_matches('"')) {
          if !decoded.is_empty() {
            return Some(decoded.into_owned());
          }
        }
      }
      "filename" => {
        let name = value.trim().trim_matches('"');
        if !name.is_empty() {
          plain = Some(name.to_string());
        }
      }
      _ => {}
    }
  }
  plain
}

/// A fetched or hand-written profile must be a YAML mapping that defines
/// proxies, directly or through providers.
pub fn validate_profile_yaml(content: &str) -> Result<(), BackendError> {
  let value: serde_yaml::Value = serde_yaml::from_str(content)
    .map_err(|e| BackendError::InvalidProfile(format!("not valid YAML: {e}")))?;
  let Some(mapping) = value.as_mapping() else {
    return Err(BackendError::InvalidProfile(
      "the profile is not a YAML mapping".to_string(),
    ));
  };
  if mapping.contains_key("proxies") || mapping.contains_key("proxy-providers") {
    Ok(())
  } else {
    Err(BackendError::InvalidProfile(
      "profile does not contain `proxies` or `proxy-providers`".to_string(),
    ))
  }
}

/// Merge profiles only need to be a mapping (or empty).
pub fn validate_merge_yaml(content: &str) -> Result<(), BackendError> {
  let value: serde_yaml::Value = serde_yaml::from_str(content)
    .map_err(|e| BackendError::InvalidProfile(format!("not valid YAML: {e}")))?;
  if value.is_mapping() || value.is_null() {
    Ok(())
  } else {
    Err(BackendError::InvalidProfile(
      "merge profile is not a YAML mapping".to_string(),
    ))
  }
}
