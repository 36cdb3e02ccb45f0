//! 에러 코드 상수 정의
//!
//! 컨트롤 플레인 응답에서 웹 UI의 i18n 처리를 위해 에러 코드를 문자열로 반환합니다.

/// 설정 패치 형식 오류
pub const ERR_CONFIG_INVALID: &str = "ERR_CONFIG_INVALID";

/// 원격 서비스가 자격 증명을 거부함
pub const ERR_REMOTE_AUTH: &str = "ERR_REMOTE_AUTH";

/// 원격 서비스 호출 실패
pub const ERR_REMOTE_UNAVAILABLE: &str = "ERR_REMOTE_UNAVAILABLE";

/// API 키가 설정되지 않음
pub const ERR_CREDENTIAL_MISSING: &str = "ERR_CREDENTIAL_MISSING";

/// 동기화 워커 재시작 실패
pub const ERR_SUPERVISOR_FAILED: &str = "ERR_SUPERVISOR_FAILED";
