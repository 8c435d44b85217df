use std::collections::HashMap;

use super::result::UNKNOWN_CLASS_NAME;

/// COCO-80 class names in model output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Chinese names for the COCO-80 classes, applied to the default label set
/// so class queries work in either language.
pub const COCO_ALIASES_ZH: [(&str, &str); 124] = [
    ("人", "person"), ("人物", "person"), ("人像", "person"),
    ("自行车", "bicycle"), ("单车", "bicycle"),
    ("汽车", "car"), ("小汽车", "car"), ("轿车", "car"),
    ("摩托车", "motorcycle"), ("电瓶车", "motorcycle"),
    ("飞机", "airplane"), ("航班", "airplane"),
    ("公交车", "bus"), ("巴士", "bus"),
    ("火车", "train"), ("列车", "train"),
    ("卡车", "truck"), ("货车", "truck"),
    ("船", "boat"), ("船只", "boat"),
    ("红绿灯", "traffic light"), ("交通灯", "traffic light"),
    ("消防栓", "fire hydrant"),
    ("停止标志", "stop sign"), ("停车标志", "stop sign"),
    ("停车计时器", "parking meter"),
    ("凳子", "bench"),
    ("鸟", "bird"), ("小鸟", "bird"),
    ("猫", "cat"), ("猫咪", "cat"),
    ("狗", "dog"), ("小狗", "dog"),
    ("马", "horse"),
    ("羊", "sheep"), ("绵羊", "sheep"),
    ("牛", "cow"), ("奶牛", "cow"),
    ("大象", "elephant"),
    ("熊", "bear"),
    ("斑马", "zebra"),
    ("长颈鹿", "giraffe"),
    ("背包", "backpack"), ("双肩包", "backpack"),
    ("雨伞", "umbrella"), ("伞", "umbrella"),
    ("手提包", "handbag"), ("手袋", "handbag"),
    ("领带", "tie"),
    ("行李箱", "suitcase"), ("手提箱", "suitcase"),
    ("飞盘", "frisbee"),
    ("滑雪板", "skis"),
    ("滑雪单板", "snowboard"),
    ("球", "sports ball"), ("运动球", "sports ball"),
    ("风筝", "kite"),
    ("棒球棒", "baseball bat"),
    ("棒球手套", "baseball glove"),
    ("滑板", "skateboard"),
    ("冲浪板", "surfboard"),
    ("网球拍", "tennis racket"),
    ("瓶子", "bottle"), ("瓶", "bottle"),
    ("酒杯", "wine glass"), ("玻璃杯", "wine glass"),
    ("杯子", "cup"), ("杯", "cup"), ("水杯", "cup"), ("茶杯", "cup"), ("咖啡杯", "cup"),
    ("叉子", "fork"),
    ("刀", "knife"), ("刀子", "knife"),
    ("勺子", "spoon"),
    ("碗", "bowl"),
    ("香蕉", "banana"),
    ("苹果", "apple"),
    ("三明治", "sandwich"),
    ("橙子", "orange"), ("橘子", "orange"),
    ("西兰花", "broccoli"),
    ("胡萝卜", "carrot"),
    ("热狗", "hot dog"),
    ("披萨", "pizza"),
    ("甜甜圈", "donut"), ("多纳圈", "donut"),
    ("蛋糕", "cake"),
    ("椅子", "chair"),
    ("沙发", "couch"), ("长椅", "couch"),
    ("盆栽", "potted plant"), ("植物", "potted plant"),
    ("床", "bed"),
    ("餐桌", "dining table"), ("桌子", "dining table"),
    ("马桶", "toilet"), ("厕所", "toilet"),
    ("电视", "tv"), ("电视机", "tv"),
    ("笔记本电脑", "laptop"), ("笔记本", "laptop"),
    ("鼠标", "mouse"),
    ("遥控器", "remote"),
    ("键盘", "keyboard"),
    ("手机", "cell phone"), ("电话", "cell phone"),
    ("微波炉", "microwave"),
    ("烤箱", "oven"),
    ("烤面包机", "toaster"),
    ("水槽", "sink"), ("洗手池", "sink"),
    ("冰箱", "refrigerator"),
    ("书", "book"), ("书籍", "book"),
    ("钟", "clock"), ("时钟", "clock"),
    ("花瓶", "vase"),
    ("剪刀", "scissors"),
    ("泰迪熊", "teddy bear"), ("玩具熊", "teddy bear"),
    ("吹风机", "hair drier"), ("电吹风", "hair drier"),
    ("牙刷", "toothbrush"),
];

/// Fixed label set for a model, plus query aliases.
#[derive(Clone, Debug)]
pub struct LabelSet {
    names: Vec<String>,
    aliases: HashMap<String, u32>,
}

impl LabelSet {
    /// COCO-80 names with the built-in Chinese aliases.
    pub fn coco() -> Self {
        let mut labels = Self::from_names(COCO_CLASSES.iter().map(|s| s.to_string()).collect());
        for (alias, label) in COCO_ALIASES_ZH {
            labels.add_alias(alias, label);
        }
        labels
    }

    pub fn from_names(names: Vec<String>) -> Self {
        Self {
            names,
            aliases: HashMap::new(),
        }
    }

    /// One label per line; surrounding whitespace and blank lines are ignored.
    pub fn from_text(text: &str) -> Self {
        let names = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self::from_names(names)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, class_id: u32) -> &str {
        self.names
            .get(class_id as usize)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_CLASS_NAME)
    }

    /// Register `alias` as another name for `label`. Returns false when
    /// `label` is not in the set.
    pub fn add_alias(&mut self, alias: &str, label: &str) -> bool {
        match self.position(label) {
            Some(class_id) => {
                self.aliases.insert(fold(alias), class_id);
                true
            }
            None => false,
        }
    }

    /// Resolve a user query to a class id: exact label first, then alias.
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn resolve(&self, query: &str) -> Option<u32> {
        let folded = fold(query);
        if folded.is_empty() {
            return None;
        }
        self.position(&folded)
            .or_else(|| self.aliases.get(&folded).copied())
    }

    fn position(&self, label: &str) -> Option<u32> {
        let folded = fold(label);
        self.names
            .iter()
            .position(|name| fold(name) == folded)
            .map(|idx| idx as u32)
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::coco()
    }
}

fn fold(value: &str) -> String {
    value.trim().to_lowercase()
}
