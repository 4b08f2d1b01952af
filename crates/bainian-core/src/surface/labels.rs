//! Accessible names of the chat client's controls.

/// Contacts tab in the main window's side bar.
pub const CONTACTS_TAB: &str = "通讯录";
/// The contacts list in the main window.
pub const CONTACTS_LIST: &str = "联系人";
/// Button inside the contacts list that opens the management window.
pub const CONTACTS_MANAGER: &str = "通讯录管理";
pub const MAXIMIZE: &str = "最大化";
/// Toggles the tag filter panel in the management window.
pub const TAG_PANEL: &str = "标签";

/// Detail-view labels; the value is the label's next sibling.
pub const WECHAT_ID_LABEL: &str = "微信号：";
pub const REGION_LABEL: &str = "地区：";
pub const TAG_LABEL: &str = "标签";

pub const SEARCH: &str = "搜索";
pub const FILE_TRANSFER: &str = "文件传输助手";

pub const MESSAGES: &str = "消息";
pub const CHAT_INFO: &str = "聊天信息";
pub const CHAT_MEMBERS: &str = "聊天成员";
pub const VIEW_MORE: &str = "查看更多";
